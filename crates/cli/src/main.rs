use std::process::ExitCode;

fn main() -> ExitCode {
    peerbook_cli::run()
}
