use std::process::ExitCode;

fn main() -> ExitCode {
    merit_cli::run()
}
