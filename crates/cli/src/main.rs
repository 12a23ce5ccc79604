use std::process::ExitCode;

fn main() -> ExitCode {
    tacoexpress_cli::run()
}
