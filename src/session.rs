//! Client-side bundle of everything that touches the secret key.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::debug;

use crate::ciphertext::Ciphertext;
use crate::context::Context;
use crate::encoding::{CkksEncoder, Encoder, SlotValues};
use crate::encrypt::{Decryptor, Encryptor};
use crate::error::{CipherfitError, Result};
use crate::eval::Evaluator;
use crate::keys::{GaloisKeys, KeyGenerator, PublicKey, RelinKeys};
use crate::params::{ClientConfig, Parameters};

/// Context, encoder, encryptor, decryptor and key handles for one client.
///
/// Passed explicitly to every client operation; nothing here is global.
pub struct Session {
    context: Arc<Context>,
    encoder: Encoder,
    encryptor: Encryptor,
    decryptor: Decryptor,
    public_key: PublicKey,
    relin_keys: RelinKeys,
    galois_keys: GaloisKeys,
    config: ClientConfig,
}

impl Session {
    /// Fresh keys from an OS-seeded ChaCha20 stream.
    pub fn new(params: Parameters) -> Result<Self> {
        let mut rng = ChaCha20Rng::from_os_rng();
        Self::with_rng(params, ClientConfig::default(), &mut rng)
    }

    pub fn with_rng<R: Rng>(params: Parameters, config: ClientConfig, rng: &mut R) -> Result<Self> {
        let context = Context::new(params)?;
        let keygen = KeyGenerator::with_rng(context.clone(), rng)?;
        let public_key = keygen.create_public_key_with_rng(rng)?;
        let relin_keys = keygen.create_relin_keys_with_rng(rng)?;
        let galois_keys = keygen.create_galois_keys_with_rng(rng)?;

        let mut encryptor = Encryptor::new(context.clone(), public_key.clone())?;
        encryptor.set_secret_key(keygen.secret_key().clone())?;
        let decryptor = Decryptor::new(context.clone(), keygen.secret_key().clone())?;
        let encoder = match Encoder::new(context.clone())? {
            Encoder::Approximate(e) => Encoder::Approximate(e.with_default_scale(config.scale)),
            batched => batched,
        };

        debug!(
            scheme = %context.scheme(),
            galois_keys = galois_keys.elements().count(),
            "session ready"
        );
        Ok(Self {
            context,
            encoder,
            encryptor,
            decryptor,
            public_key,
            relin_keys,
            galois_keys,
            config,
        })
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn parameters(&self) -> &Parameters {
        self.context.parameters()
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    pub fn encryptor(&self) -> &Encryptor {
        &self.encryptor
    }

    pub fn decryptor(&self) -> &Decryptor {
        &self.decryptor
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn relin_keys(&self) -> &RelinKeys {
        &self.relin_keys
    }

    pub fn galois_keys(&self) -> &GaloisKeys {
        &self.galois_keys
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Evaluator over this session's context, for local computation.
    pub fn evaluator(&self) -> Evaluator {
        Evaluator::new(self.context.clone())
    }

    pub(crate) fn ckks_encoder(&self) -> Result<&CkksEncoder> {
        match &self.encoder {
            Encoder::Approximate(e) => Ok(e),
            Encoder::Batched(_) => Err(CipherfitError::Unsupported {
                op: "real-valued encoding",
                scheme: self.context.scheme(),
            }),
        }
    }

    /// Encode at the top level and encrypt with the secret key.
    pub fn encrypt(&self, values: &SlotValues) -> Result<Ciphertext> {
        let mut rng = ChaCha20Rng::from_os_rng();
        self.encrypt_with_rng(values, &mut rng)
    }

    pub fn encrypt_with_rng<R: Rng>(&self, values: &SlotValues, rng: &mut R) -> Result<Ciphertext> {
        let plain = self.encoder.encode(values, None, None)?;
        self.encryptor.encrypt_symmetric_with_rng(&plain, rng)
    }

    pub fn decrypt(&self, ct: &Ciphertext) -> Result<SlotValues> {
        self.encoder.decode(&self.decryptor.decrypt(ct)?)
    }
}
