use std::process::ExitCode;

fn main() -> ExitCode {
    deckyard_cli::run()
}
