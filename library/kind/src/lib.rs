pub use kind_derive::*;

/// A type that implements Kind can describe itself to outside systems,
/// typically by simply returning the name of its own type. The router embeds
/// this discriminator in every error envelope it sends over the wire so that
/// clients can dispatch on the class of failure without parsing prose.
///
/// The easiest implementation is the derive macro.
///
/// ```
/// use kind::Kind;
///
/// #[derive(Kind)]
/// struct MyKind {}
///
/// #[derive(Kind)]
/// enum MyEnum {
///     VariantOne,
///     VariantTwo(u32),
/// }
///
/// assert_eq!("MyKind", MyKind {}.kind());
/// assert_eq!("MyEnum::VariantOne", MyEnum::VariantOne.kind());
/// assert_eq!("MyEnum::VariantTwo", MyEnum::VariantTwo(42).kind());
/// ```
///
/// The derive macro does not work on unions. If you find yourself needing
/// that, then you must implement Kind on the target union yourself.
///
/// A blanket implementation exists for [Vec<T>](std::vec::Vec) where T
/// implements Kind, reporting `List[T::kind()]` (`List[]` when empty).
pub trait Kind {
    fn kind(&self) -> String;
}

macro_rules! impl_kind {
    ($i:ty) => {
        impl Kind for $i {
            fn kind(&self) -> String {
                stringify!($i).to_string()
            }
        }
    };
}

impl_kind!(());
impl_kind!(String);
impl_kind!(bool);
impl_kind!(u32);
impl_kind!(u64);
impl_kind!(i32);
impl_kind!(i64);
impl_kind!(f64);

impl<T> Kind for Vec<T>
where
    T: Kind,
{
    fn kind(&self) -> String {
        match self.first() {
            Some(item) => format!("List[{}]", item.kind()),
            None => "List[]".to_string(),
        }
    }
}

#[cfg(test)]
#[allow(dead_code)]
mod tests {
    use super::*;

    #[test]
    fn simple_struct() {
        #[derive(Kind)]
        struct Widget {}
        assert_eq!(Widget {}.kind(), "Widget")
    }

    #[test]
    fn mixed_enum() {
        #[derive(Kind)]
        enum AnEnum {
            Unit,
            UnaryUnnamed(i32),
            BinaryUnnamed(i32, i32),
            UnaryNamed { a: i32 },
            BinaryNamed { a: i32, b: i32 },
        }
        assert_eq!(AnEnum::Unit.kind(), "AnEnum::Unit");
        assert_eq!(AnEnum::UnaryUnnamed(1).kind(), "AnEnum::UnaryUnnamed");
        assert_eq!(AnEnum::BinaryUnnamed(1, 2).kind(), "AnEnum::BinaryUnnamed");
        assert_eq!(AnEnum::UnaryNamed { a: 1 }.kind(), "AnEnum::UnaryNamed");
        assert_eq!(
            AnEnum::BinaryNamed { a: 1, b: 2 }.kind(),
            "AnEnum::BinaryNamed"
        );
    }

    #[test]
    fn vectors() {
        #[derive(Kind)]
        struct Widget {}
        assert_eq!(vec![Widget {}, Widget {}].kind(), "List[Widget]");
        assert_eq!(Vec::<Widget>::new().kind(), "List[]");
    }
}
