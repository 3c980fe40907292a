pub mod progress_failure;
pub mod progress_run;
pub mod progress_success;
