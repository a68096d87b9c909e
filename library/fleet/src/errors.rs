use error::*;

#[derive(Error, Kind, VcrError, HttpCode, Debug)]
pub enum ApiError {
    #[error("The fleet API server rejected our request")]
    #[code(Status::InternalServerError)]
    Api(#[source] kube::Error),
    #[error("Failed to connect to the fleet API server")]
    #[code(Status::InternalServerError)]
    Connection(#[source] kube::Error),
    // @TODO quite a few more things can go wrong in theory. These are the
    // ones we have actually observed; everything else lands in Rest.
    #[error("The fleet API server request failed")]
    #[code(Status::InternalServerError)]
    Rest(#[source] kube::Error),
}

impl From<kube::Error> for ApiError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(_) => ApiError::Api(err),
            kube::Error::Connection(_) => ApiError::Connection(err),
            _ => ApiError::Rest(err),
        }
    }
}
