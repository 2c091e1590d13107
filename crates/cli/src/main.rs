use std::process::ExitCode;

fn main() -> ExitCode {
    santai_cli::run()
}
