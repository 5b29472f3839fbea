use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match audiograb_lib::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("audiograb: {}", e);
            ExitCode::FAILURE
        }
    }
}
