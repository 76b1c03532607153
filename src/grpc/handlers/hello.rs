use crate::grpc::pb::hello::{hello_service_server::HelloService, HelloRequest, HelloResponse};
use tonic::{async_trait, Request, Response, Status};
use tracing::debug;

/// Greets callers, tagging replies with the instance that answered so a
/// client can see requests spread across instances.
pub struct HelloHandler {
    instance: String,
}

impl HelloHandler {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }
}

#[async_trait]
impl HelloService for HelloHandler {
    async fn say_hello(&self, request: Request<HelloRequest>) -> Result<Response<HelloResponse>, Status> {
        let name = request.into_inner().name;
        if name.trim().is_empty() {
            return Err(Status::invalid_argument("name must not be empty"));
        }

        debug!("{} greeting {}", self.instance, name);
        Ok(Response::new(HelloResponse {
            result: format!("hi, {}! ({})", name, self.instance),
        }))
    }
}
