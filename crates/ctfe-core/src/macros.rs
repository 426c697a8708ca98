/// Macro to return early with an error
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::error::Error::Generic(format!($($arg)*)))
    };
}

/// Build a diagnostic from a descriptor, a location and display arguments.
#[macro_export]
macro_rules! diagnostic {
    ($descriptor:expr, $location:expr) => {
        $descriptor.at($location, Vec::new())
    };
    ($descriptor:expr, $location:expr, $($arg:expr),+ $(,)?) => {
        $descriptor.at($location, vec![$($arg.to_string()),+])
    };
}
