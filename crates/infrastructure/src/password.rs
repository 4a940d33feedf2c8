use application::{PasswordHasher, PasswordHasherError};
use async_trait::async_trait;
use bcrypt::DEFAULT_COST;
use domain::PasswordHash;
use tokio::task::spawn_blocking;

/// bcrypt 哈希，计算放到阻塞线程池执行
#[derive(Debug, Clone)]
pub struct BcryptPasswordHasher {
    cost: u32,
}

impl BcryptPasswordHasher {
    pub fn new(cost: Option<u32>) -> Self {
        Self {
            cost: cost.unwrap_or(DEFAULT_COST),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }
}

impl Default for BcryptPasswordHasher {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl PasswordHasher for BcryptPasswordHasher {
    async fn hash(&self, plaintext: &str) -> Result<PasswordHash, PasswordHasherError> {
        let cost = self.cost;
        let plaintext = plaintext.to_owned();
        let hashed = spawn_blocking(move || bcrypt::hash(plaintext, cost))
            .await
            .map_err(|err| PasswordHasherError::hash_error(err.to_string()))?
            .map_err(|err| PasswordHasherError::hash_error(err.to_string()))?;

        PasswordHash::new(hashed).map_err(|err| PasswordHasherError::hash_error(err.to_string()))
    }

    async fn verify(&self, plaintext: &str, hashed: &PasswordHash) -> Result<bool, PasswordHasherError> {
        let plaintext = plaintext.to_owned();
        let hashed = hashed.as_str().to_owned();
        spawn_blocking(move || bcrypt::verify(plaintext, &hashed))
            .await
            .map_err(|err| PasswordHasherError::verify_error(err.to_string()))?
            .map_err(|err| PasswordHasherError::verify_error(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_then_verify() {
        let hasher = BcryptPasswordHasher::new(Some(4));
        let hashed = hasher.hash("correct horse").await.unwrap();

        assert_ne!(hashed.as_str(), "correct horse");
        assert!(hasher.verify("correct horse", &hashed).await.unwrap());
        assert!(!hasher.verify("wrong horse", &hashed).await.unwrap());
    }

    #[tokio::test]
    async fn malformed_hash_is_an_error() {
        let hasher = BcryptPasswordHasher::new(Some(4));
        let bogus = PasswordHash::new("not-a-bcrypt-hash").unwrap();
        assert!(hasher.verify("anything", &bogus).await.is_err());
    }
}
