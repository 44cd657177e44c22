//! Process exit codes of `homebuild`.
//! Scripts wrapping the builder rely on these; keep them stable.

use homebuild_core::BuildError;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1; // IO or anything not classified below
pub const EXIT_INPUT_ERROR: i32 = 2; // Model folder, scene container or config problem
pub const EXIT_TOOLCHAIN_ERROR: i32 = 3; // Runtime missing, aligner/signer failed
pub const EXIT_PACKAGE_ERROR: i32 = 4; // Template or zip rewrite problem
pub const EXIT_CANCELLED: i32 = 130;

/// Exit code for a failed run; errors that carry no [`BuildError`] map to [`EXIT_FAILURE`].
pub fn for_error(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<BuildError>()
        .map(BuildError::exit_code)
        .unwrap_or(EXIT_FAILURE)
}
