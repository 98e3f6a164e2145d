use mailpost::{Error, Failure};

// See sysexits.h
pub const UNAVAILABLE: i32 = 69;
pub const TEMPFAIL: i32 = 75;
pub const CONFIG: i32 = 78;

/// Map a pipeline failure to the exit status reported to the MTA.
///
/// Temporary failures ask the MTA to requeue the message. Everything else
/// makes it bounce.
pub fn exit_code(failure: &Failure) -> i32 {
    match &failure.error {
        err if err.is_temporary() => TEMPFAIL,
        Error::Config(_) => CONFIG,
        _ => UNAVAILABLE,
    }
}
