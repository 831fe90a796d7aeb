use uuid::Uuid;

/// Source of single-use tokens for verification and password reset links.
pub trait TokenGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random v4 UUIDs. `fast-rng` backs them with a CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidTokenGenerator;

impl TokenGenerator for UuidTokenGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
