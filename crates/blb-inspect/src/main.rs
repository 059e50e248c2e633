#![forbid(unsafe_code)]

fn main() {
    if let Err(error) = blb_inspect::run_from_env() {
        tracing::debug!(exit_code = error.exit_code(), "command failed");
        eprintln!("blb-inspect: {error}");
        std::process::exit(error.exit_code());
    }
}
