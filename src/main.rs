//! imgdup - find similar images in a directory tree

mod cli;

use std::process::ExitCode;

fn main() -> ExitCode {
    cli::run()
}
