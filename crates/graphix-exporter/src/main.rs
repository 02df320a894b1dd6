use std::process::ExitCode;

fn main() -> ExitCode {
    graphix_exporter::runtime::run_from_args()
}
