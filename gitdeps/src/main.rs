//! `gitdeps` CLI entrypoint.
//!
//! Resolves the packs an Unreal Engine checkout's `.ue4dependencies` manifest
//! needs, fetches them from a local cache or the CDN, and extracts the files
//! they carry. Diagnostics stream to stderr; command results go to stdout.

use clap::Parser;
use std::io::{self, Write};
use ue_gitdeps::cli::Cli;
use ue_gitdeps::commands::dispatch;
use ue_gitdeps::error::Result;
use ue_gitdeps::events::WriterSink;

fn main() {
    let cli = Cli::parse();
    let sink = WriterSink::new(
        io::stderr(),
        WriterSink::<io::Stderr>::level_for(cli.verbosity, cli.quiet),
    );
    let mut stdout = io::stdout().lock();
    let run_result = dispatch(&cli, &sink, &mut stdout);
    let exit_code = exit_code_for_run_result(run_result, &mut io::stderr());
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, format_args!("error: {}", err.chain()));
            1
        }
    }
}

fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort reporting; ignore write failures.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ue_gitdeps::error::GitDepsError;
    use ue_gitdeps::manifest::ManifestLoadError;

    #[test]
    fn exit_code_for_run_result_returns_zero_on_success() {
        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Ok(()), &mut stderr);
        assert_eq!(exit_code, 0);
        assert!(stderr.is_empty());
    }

    #[test]
    fn exit_code_for_run_result_prints_chain_and_returns_one() {
        let err = GitDepsError::Load(ManifestLoadError::Io {
            path: "/ue/.ue4dependencies".into(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
        });

        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Err(err), &mut stderr);
        assert_eq!(exit_code, 1);

        let stderr_text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert_eq!(
            stderr_text,
            "error: failed to read manifest /ue/.ue4dependencies: permission denied\n"
        );
    }
}
