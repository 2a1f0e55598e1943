//! Operation boundary macros
//!
//! Every engine operation emits one `start` event and then exactly one of
//! `end` or `end_error`. Extra `key = value` fields are passed through to
//! `tracing` unchanged, so `%` and `?` sigils work as usual.

/// Entry of an operation, at `info`
///
/// ```
/// # use draftline_core::log_op_start;
/// log_op_start!("current_draft");
/// log_op_start!("current_draft", owner = "post:1", force_reload = true);
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr $(, $($field:tt)+)?) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_START,
            $($($field)+)?
        )
    };
}

/// Successful exit of an operation, at `info`
///
/// ```
/// # use draftline_core::log_op_end;
/// log_op_end!("commit", duration_ms = 42_u64);
/// log_op_end!("destroy_draft", duration_ms = 3_u64, removed = 1_usize);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr $(, $($field:tt)+)?) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_END,
            duration_ms = $duration,
            $($($field)+)?
        )
    };
}

/// Failed exit of an operation, at `error`
///
/// `$err` is anything convertible into `ExError`; its kind and stable code
/// are logged as `err.kind` and `err.code`.
///
/// ```
/// # use draftline_core::{log_op_error, errors::DraftlineError};
/// let err = DraftlineError::UnknownKind { kind: "page".to_string() };
/// log_op_error!("create", err, duration_ms = 10_u64);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr $(, $($field:tt)+)?) => {{
        let failure: $crate::errors::ExError = $err.into();
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err.kind = ?failure.kind(),
            err.code = failure.code(),
            $($($field)+)?
        )
    }};
}
