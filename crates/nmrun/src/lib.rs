pub mod bridge;
pub mod callback;
pub mod config;
pub mod mock_transport;
pub mod pending;
pub mod proxy;
pub mod transport;
pub mod value;

pub use bridge::Bridge;
pub use bridge::BridgeBuilder;
pub use bridge::PendingCall;
pub use callback::Callback;
pub use config::BridgeConfig;
pub use proxy::RemoteObject;
pub use transport::Delivery;
pub use transport::Origin;
pub use transport::Transport;
pub use value::Value;
