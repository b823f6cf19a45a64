//! Byte form of everything that crosses the client/server boundary.
//!
//! Artifacts are bincode-encoded wire structs holding NTT residues and the
//! `ParmsId` they were produced under. Loading always happens against a
//! `Context` and re-checks ids, shapes and residue ranges; nothing read from
//! the wire is trusted as-is.

use std::collections::BTreeMap;

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::ciphertext::Ciphertext;
use crate::context::{Context, ParmsId};
use crate::encoding::Plaintext;
use crate::error::{CipherfitError, Result};
use crate::keys::{GaloisKeys, KeySwitchKey, PublicKey, RelinKeys};
use crate::params::Parameters;
use crate::ring::rns::{RnsBasis, RnsPoly};

/// Upper bound for one artifact; Galois keys at n = 32768 stay well below.
pub const MAX_ARTIFACT_BYTES: u64 = 1 << 30;

const MAGIC: [u8; 4] = *b"CFIT";
const FORMAT_VERSION: u16 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum ArtifactKind {
    Parameters,
    PublicKey,
    RelinKeys,
    GaloisKeys,
    Ciphertext,
    Plaintext,
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    magic: [u8; 4],
    version: u16,
    kind: ArtifactKind,
    body: T,
}

type Residues = Vec<Vec<u64>>;

#[derive(Serialize, Deserialize)]
struct CiphertextWire {
    parms_id: ParmsId,
    level: u64,
    scale: f64,
    polys: Vec<Residues>,
}

#[derive(Serialize, Deserialize)]
struct PlaintextWire {
    parms_id: ParmsId,
    level: u64,
    scale: f64,
    poly: Residues,
}

#[derive(Serialize, Deserialize)]
struct PublicKeyWire {
    parms_id: ParmsId,
    p0: Residues,
    p1: Residues,
}

#[derive(Serialize, Deserialize)]
struct KeySwitchWire {
    digits: Vec<(Residues, Residues)>,
}

#[derive(Serialize, Deserialize)]
struct RelinKeysWire {
    parms_id: ParmsId,
    key: KeySwitchWire,
}

#[derive(Serialize, Deserialize)]
struct GaloisKeysWire {
    parms_id: ParmsId,
    keys: Vec<(u64, KeySwitchWire)>,
}

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(MAX_ARTIFACT_BYTES)
        .with_fixint_encoding()
}

fn encode<T: Serialize>(kind: ArtifactKind, body: T) -> Result<Vec<u8>> {
    let envelope = Envelope { magic: MAGIC, version: FORMAT_VERSION, kind, body };
    Ok(options().serialize(&envelope)?)
}

fn decode<T: DeserializeOwned>(kind: ArtifactKind, bytes: &[u8]) -> Result<T> {
    let envelope: Envelope<T> = options().deserialize(bytes)?;
    if envelope.magic != MAGIC {
        return Err(CipherfitError::Serialization("not a cipherfit artifact".into()));
    }
    if envelope.version != FORMAT_VERSION {
        return Err(CipherfitError::Serialization(format!(
            "unsupported format version {}", envelope.version
        )));
    }
    if envelope.kind != kind {
        return Err(CipherfitError::Serialization(format!(
            "expected {kind:?}, found {:?}", envelope.kind
        )));
    }
    Ok(envelope.body)
}

fn expect_id(found: ParmsId, expected: ParmsId, what: &str) -> Result<()> {
    if found != expected {
        return Err(CipherfitError::LevelMismatch(format!(
            "{what} was produced under different parameters"
        )));
    }
    Ok(())
}

fn check_scale(scale: f64) -> Result<()> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(CipherfitError::InvalidInput(format!("invalid scale {scale}")));
    }
    Ok(())
}

/// Save/load for artifacts that only make sense under a `Context`.
pub trait Artifact: Sized {
    fn save(&self) -> Result<Vec<u8>>;

    fn load(context: &Context, bytes: &[u8]) -> Result<Self>;
}

impl Parameters {
    pub fn save(&self) -> Result<Vec<u8>> {
        encode(ArtifactKind::Parameters, self)
    }

    /// Deserialize and re-run the validity predicate.
    pub fn load(bytes: &[u8]) -> Result<Self> {
        let params: Parameters = decode(ArtifactKind::Parameters, bytes)?;
        params.validate()?;
        Ok(params)
    }
}

impl Artifact for Ciphertext {
    fn save(&self) -> Result<Vec<u8>> {
        encode(ArtifactKind::Ciphertext, CiphertextWire {
            parms_id: self.parms_id,
            level: self.level as u64,
            scale: self.scale,
            polys: self.polys.iter().map(RnsPoly::to_ntt_residues).collect(),
        })
    }

    fn load(context: &Context, bytes: &[u8]) -> Result<Self> {
        let wire: CiphertextWire = decode(ArtifactKind::Ciphertext, bytes)?;
        let level_ctx = context.level(wire.level as usize)?;
        expect_id(wire.parms_id, level_ctx.parms_id, "ciphertext")?;
        check_scale(wire.scale)?;
        if !(2..=3).contains(&wire.polys.len()) {
            return Err(CipherfitError::InvalidSize {
                expected: 1,
                got: wire.polys.len().saturating_sub(1),
            });
        }
        let polys = wire.polys.into_iter()
            .map(|r| RnsPoly::from_ntt_residues(r, &level_ctx.basis))
            .collect::<Result<Vec<_>>>()?;
        Ok(Ciphertext { polys, parms_id: wire.parms_id, level: level_ctx.level, scale: wire.scale })
    }
}

impl Artifact for Plaintext {
    fn save(&self) -> Result<Vec<u8>> {
        encode(ArtifactKind::Plaintext, PlaintextWire {
            parms_id: self.parms_id,
            level: self.level as u64,
            scale: self.scale,
            poly: self.poly.to_ntt_residues(),
        })
    }

    fn load(context: &Context, bytes: &[u8]) -> Result<Self> {
        let wire: PlaintextWire = decode(ArtifactKind::Plaintext, bytes)?;
        let level_ctx = context.level(wire.level as usize)?;
        expect_id(wire.parms_id, level_ctx.parms_id, "plaintext")?;
        check_scale(wire.scale)?;
        let poly = RnsPoly::from_ntt_residues(wire.poly, &level_ctx.basis)?;
        Ok(Plaintext { poly, parms_id: wire.parms_id, level: level_ctx.level, scale: wire.scale })
    }
}

impl Artifact for PublicKey {
    fn save(&self) -> Result<Vec<u8>> {
        encode(ArtifactKind::PublicKey, PublicKeyWire {
            parms_id: self.parms_id,
            p0: self.p0.to_ntt_residues(),
            p1: self.p1.to_ntt_residues(),
        })
    }

    fn load(context: &Context, bytes: &[u8]) -> Result<Self> {
        let wire: PublicKeyWire = decode(ArtifactKind::PublicKey, bytes)?;
        expect_id(wire.parms_id, context.first_parms_id(), "public key")?;
        let basis = &context.level(0)?.basis;
        Ok(PublicKey {
            p0: RnsPoly::from_ntt_residues(wire.p0, basis)?,
            p1: RnsPoly::from_ntt_residues(wire.p1, basis)?,
            parms_id: wire.parms_id,
        })
    }
}

impl KeySwitchKey {
    fn to_wire(&self) -> KeySwitchWire {
        KeySwitchWire {
            digits: self.keys.iter()
                .map(|(k0, k1)| (k0.to_ntt_residues(), k1.to_ntt_residues()))
                .collect(),
        }
    }

    fn from_wire(wire: KeySwitchWire, context: &Context) -> Result<Self> {
        let expected = context.parameters().data_moduli().len();
        if wire.digits.len() != expected {
            return Err(CipherfitError::DimensionMismatch { expected, got: wire.digits.len() });
        }
        let basis: &RnsBasis = context.key_basis();
        let keys = wire.digits.into_iter()
            .map(|(k0, k1)| Ok((
                RnsPoly::from_ntt_residues(k0, basis)?,
                RnsPoly::from_ntt_residues(k1, basis)?,
            )))
            .collect::<Result<Vec<_>>>()?;
        Ok(KeySwitchKey { keys })
    }
}

impl Artifact for RelinKeys {
    fn save(&self) -> Result<Vec<u8>> {
        encode(ArtifactKind::RelinKeys, RelinKeysWire {
            parms_id: self.parms_id,
            key: self.key.to_wire(),
        })
    }

    fn load(context: &Context, bytes: &[u8]) -> Result<Self> {
        let wire: RelinKeysWire = decode(ArtifactKind::RelinKeys, bytes)?;
        expect_id(wire.parms_id, context.key_parms_id(), "relinearization keys")?;
        Ok(RelinKeys {
            key: KeySwitchKey::from_wire(wire.key, context)?,
            parms_id: wire.parms_id,
        })
    }
}

impl Artifact for GaloisKeys {
    fn save(&self) -> Result<Vec<u8>> {
        encode(ArtifactKind::GaloisKeys, GaloisKeysWire {
            parms_id: self.parms_id,
            keys: self.keys.iter().map(|(&g, k)| (g as u64, k.to_wire())).collect(),
        })
    }

    fn load(context: &Context, bytes: &[u8]) -> Result<Self> {
        let wire: GaloisKeysWire = decode(ArtifactKind::GaloisKeys, bytes)?;
        expect_id(wire.parms_id, context.key_parms_id(), "Galois keys")?;
        let two_n = 2 * context.ring_degree() as u64;
        let mut keys = BTreeMap::new();
        for (element, key) in wire.keys {
            if element % 2 == 0 || element >= two_n {
                return Err(CipherfitError::InvalidInput(format!(
                    "{element} is not a Galois element"
                )));
            }
            keys.insert(element as usize, KeySwitchKey::from_wire(key, context)?);
        }
        Ok(GaloisKeys { keys, parms_id: wire.parms_id })
    }
}
