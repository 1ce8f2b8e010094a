use std::process::ExitCode;

fn main() -> ExitCode {
    tokenbot_cli::run()
}
