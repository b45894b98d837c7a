//! Persistent node identity stored as a hex encoded secret key

use peerchat_p2p::SecretKey;
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

use crate::Result;

/// Load the secret key at `path`, creating and saving a new one when the
/// file is missing, unreadable or malformed
///
/// # Errors
///
/// Returns an error if a new key cannot be written.
pub async fn load_or_create_secret_key(path: &Path) -> Result<SecretKey> {
    if !path.exists() {
        info!(
            "P2P secret key file not found at {}, generating new key",
            path.display()
        );
        return create_and_save_secret_key(path).await;
    }

    match fs::read_to_string(path).await {
        Ok(contents) => match decode_secret_key(contents.trim()) {
            Some(secret_key) => {
                info!("Loaded P2P secret key from {}", path.display());
                Ok(secret_key)
            }
            None => {
                warn!(
                    "Invalid P2P secret key format in {}, generating new key",
                    path.display()
                );
                create_and_save_secret_key(path).await
            }
        },
        Err(e) => {
            warn!(
                "Failed to read P2P secret key from {}: {e}, generating new key",
                path.display()
            );
            create_and_save_secret_key(path).await
        }
    }
}

fn decode_secret_key(hex_key: &str) -> Option<SecretKey> {
    let bytes: [u8; 32] = hex::decode(hex_key).ok()?.try_into().ok()?;
    Some(SecretKey::from_bytes(&bytes))
}

async fn create_and_save_secret_key(path: &Path) -> Result<SecretKey> {
    let secret_key = SecretKey::generate(&mut rand::thread_rng());

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, hex::encode(secret_key.to_bytes())).await?;

    info!("Created and saved new P2P secret key to {}", path.display());
    Ok(secret_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_key_is_created_then_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("node.key");

        let created = load_or_create_secret_key(&path).await.unwrap();
        assert!(path.exists());

        let loaded = load_or_create_secret_key(&path).await.unwrap();
        assert_eq!(created.public(), loaded.public());
    }

    #[tokio::test]
    async fn test_malformed_key_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.key");
        std::fs::write(&path, "definitely not hex").unwrap();

        let key = load_or_create_secret_key(&path).await.unwrap();
        let stored = std::fs::read_to_string(&path).unwrap();
        assert_eq!(stored, hex::encode(key.to_bytes()));
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert!(decode_secret_key(&hex::encode([7u8; 16])).is_none());
        assert!(decode_secret_key(&hex::encode([7u8; 32])).is_some());
    }
}
