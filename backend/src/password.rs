use argon2::Config;
use rand::RngCore;
use thiserror::Error;

/// Hashes and verifies user passwords with argon2, keyed with an application-wide secret so
/// leaked database rows alone are not enough to attack the hashes offline.
#[derive(Clone, Debug)]
pub struct PasswordHasher {
  secret_key: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum HashError {
  #[error(transparent)]
  HashFail(#[from] argon2::Error),
}

const SALT_SIZE: usize = 32;

impl PasswordHasher {
  pub fn new<S: Into<Vec<u8>>>(secret_key: S) -> Self {
    Self { secret_key: secret_key.into() }
  }

  /// Hashes `password` with a freshly generated salt, returning `(hash, salt)`.
  pub fn hash_with_new_salt<P: AsRef<[u8]>>(&self, password: P) -> Result<(Vec<u8>, Vec<u8>), HashError> {
    let salt = self.generate_salt();
    let hash = self.hash(password, &salt)?;
    Ok((hash, salt))
  }

  pub fn hash<P: AsRef<[u8]>, S: AsRef<[u8]>>(&self, password: P, salt: S) -> Result<Vec<u8>, HashError> {
    Ok(argon2::hash_raw(password.as_ref(), salt.as_ref(), &self.config())?)
  }

  pub fn verify<P: AsRef<[u8]>, S: AsRef<[u8]>, H: AsRef<[u8]>>(&self, password: P, salt: S, hash: H) -> Result<bool, HashError> {
    Ok(argon2::verify_raw(password.as_ref(), salt.as_ref(), hash.as_ref(), &self.config())?)
  }

  pub fn generate_salt(&self) -> Vec<u8> {
    let mut salt = vec![0; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
  }

  fn config(&self) -> Config {
    // Config borrows the secret key, so it is rebuilt per call instead of stored on self.
    Config {
      secret: &self.secret_key,
      ..Config::default()
    }
  }
}
