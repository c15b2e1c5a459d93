#[tokio::main]
async fn main() -> Result<(), hire_api::error::ApiError> {
    hire_api::run().await
}
