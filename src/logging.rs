//! Crate-internal logging macros.
//!
//! With the `tracing` feature (on by default) every level macro forwards to `tracing` under the
//! `event_extractor` target. Without it the calls compile away. Call sites stick to the
//! `field = value, ..., "message"` shape so both modes accept them.

#[doc(hidden)]
#[macro_export]
#[cfg(feature = "tracing")]
macro_rules! __log {
    ($level:ident, $($arg:tt)*) => {
        ::tracing::$level!(target: "event_extractor", $($arg)*)
    };
}

#[doc(hidden)]
#[macro_export]
#[cfg(not(feature = "tracing"))]
macro_rules! __log {
    ($level:ident, $($arg:tt)*) => {
        $crate::__log_discard!($($arg)*)
    };
}

/// Evaluates (by reference) every field value so disabled logging does not leave unused
/// bindings behind, then drops the message.
#[doc(hidden)]
#[macro_export]
#[cfg(not(feature = "tracing"))]
macro_rules! __log_discard {
    ($field:ident = % $value:expr, $($rest:tt)*) => {
        { let _ = &$value; $crate::__log_discard!($($rest)*); }
    };
    ($field:ident = ? $value:expr, $($rest:tt)*) => {
        { let _ = &$value; $crate::__log_discard!($($rest)*); }
    };
    ($field:ident = $value:expr, $($rest:tt)*) => {
        { let _ = &$value; $crate::__log_discard!($($rest)*); }
    };
    ($message:literal) => {};
    () => {};
}

#[allow(unused_macros)]
macro_rules! error {
    ($($arg:tt)*) => { $crate::__log!(error, $($arg)*) };
}

#[allow(unused_macros)]
macro_rules! warn {
    ($($arg:tt)*) => { $crate::__log!(warn, $($arg)*) };
}

#[allow(unused_macros)]
macro_rules! info {
    ($($arg:tt)*) => { $crate::__log!(info, $($arg)*) };
}

#[allow(unused_macros)]
macro_rules! debug {
    ($($arg:tt)*) => { $crate::__log!(debug, $($arg)*) };
}

#[allow(unused_macros)]
macro_rules! trace {
    ($($arg:tt)*) => { $crate::__log!(trace, $($arg)*) };
}
