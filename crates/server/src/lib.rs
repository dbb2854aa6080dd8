pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;

pub type DeploymentImpl = local_deployment::LocalDeployment;

pub use routes::router as app;
