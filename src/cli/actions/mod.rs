pub mod server;

use crate::gateway::state::{LoginConfig, ResourceServerMode};
use secrecy::SecretString;

/// Actions the command line can dispatch.
#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        management_port: Option<u16>,
        secret_key: SecretString,
        resource_server: ResourceServerMode,
        login: LoginConfig,
        users: Vec<String>,
    },
}
