pub mod client;
pub mod error;
pub mod signature;
pub mod types;

pub use client::{PaymentGateway, RazorpayConfig, RazorpayGateway};
pub use error::{GatewayError, GatewayResult};
pub use types::{CreateGatewayOrder, GatewayOrder};
