pub mod bot_auth;

pub use bot_auth::BotAuth;
