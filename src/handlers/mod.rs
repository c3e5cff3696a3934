pub mod webhook;

pub use webhook::WebhookHandler;
