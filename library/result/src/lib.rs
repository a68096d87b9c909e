use error::VcrError;

/// A Result is an alias of [std::result::Result](std::result::Result) with
/// its error variant pre-populated with a `Box<dyn VcrError>`. This allows
/// for shorter notation throughout the codebase.
///
/// For example, instead of writing...
///
/// ```
/// use error::VcrError;
///
/// fn greet() -> Result<&'static str, Box<dyn VcrError>> {
///     Ok("Hello, caller!")
/// }
/// ```
///
/// ...you can simply say...
///
/// ```
/// use error::VcrError;
/// use result::Result;
///
/// fn greet() -> Result<&'static str> {
///     Ok("Hello, caller!")
/// }
/// ```
///
/// It also helps in easily identifying if any functions are returning errors
/// BEFORE converting them into project native [VcrError](error::VcrError)s.
pub type Result<T> = std::result::Result<T, Box<dyn VcrError>>;
