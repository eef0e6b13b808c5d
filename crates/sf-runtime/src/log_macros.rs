/// Domain-aware logging macros.
///
/// Each macro injects a `domain` field so call sites never repeat the string
/// literal. Domains: `sys` (driver and lifecycle), `step` (step drive
/// loops), `job` (job execution), `sched` (scheduler interaction).
///
/// # Usage
///
/// ```ignore
/// sf_info!(sys, steps = 4, "workflow started");
/// sf_debug!(step, step = %name, "received termination token");
/// sf_warn!(job, error = %e, "job task panicked");
/// ```
///
/// The domain is a bare identifier converted to a `&str` by the macro; any
/// tracing-compatible field syntax may follow it.

/// Internal helper. Do not call directly; use `sf_error!` … `sf_trace!`.
#[doc(hidden)]
macro_rules! sf_log {
    ($level:ident, $domain:ident, $($field:tt)*) => {
        tracing::$level!(domain = stringify!($domain), $($field)*)
    };
}

/// Log at ERROR level with an automatic `domain` field.
macro_rules! sf_error {
    ($domain:ident, $($rest:tt)*) => {
        sf_log!(error, $domain, $($rest)*)
    };
}

/// Log at WARN level with an automatic `domain` field.
macro_rules! sf_warn {
    ($domain:ident, $($rest:tt)*) => {
        sf_log!(warn, $domain, $($rest)*)
    };
}

/// Log at INFO level with an automatic `domain` field.
macro_rules! sf_info {
    ($domain:ident, $($rest:tt)*) => {
        sf_log!(info, $domain, $($rest)*)
    };
}

/// Log at DEBUG level with an automatic `domain` field.
macro_rules! sf_debug {
    ($domain:ident, $($rest:tt)*) => {
        sf_log!(debug, $domain, $($rest)*)
    };
}

/// Log at TRACE level with an automatic `domain` field.
#[allow(unused_macros)]
macro_rules! sf_trace {
    ($domain:ident, $($rest:tt)*) => {
        sf_log!(trace, $domain, $($rest)*)
    };
}
