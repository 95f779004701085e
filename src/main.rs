use std::process::ExitCode;

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    match edc_validator::app::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}
