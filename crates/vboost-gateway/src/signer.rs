//! EIP-712 order signing.
//!
//! Every `create_order` carries a typed-data signature over the order's
//! economic fields:
//! 1. Convert the intent into integer venue units (`SignableOrder`)
//! 2. Hash it as `Order` under the domain `{name, version, chainId}`
//! 3. Sign the hash with the account's session key
//!
//! The resulting `OrderSignature` is embedded verbatim in the request body.

use std::path::PathBuf;

use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer as AlloySigner;
use alloy::sol;
use alloy::sol_types::eip712_domain;
use alloy::sol_types::SolStruct;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use thiserror::Error;
use vboost_core::{InstrumentMeta, OrderIntent};
use zeroize::Zeroizing;

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::BoxFuture;

pub const EIP712_DOMAIN_NAME: &str = "GRVT Exchange";
pub const EIP712_DOMAIN_VERSION: &str = "0";

/// Orders stay valid for 30 days.
pub const ORDER_EXPIRY_NS: i64 = 30 * 24 * 60 * 60 * 1_000_000_000;

/// Limit prices are signed with 9 implied decimals.
const PRICE_DECIMALS: u32 = 9;

// =============================================================================
// KeySource
// =============================================================================

/// Where a secret (signing key or session token) is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Load from environment variable (development).
    EnvVar { var_name: String },
    /// Load from file (production, recommend 0600 permissions).
    File { path: PathBuf },
}

impl KeySource {
    /// Read the secret, trimming surrounding whitespace.
    pub fn load(&self) -> Result<Zeroizing<String>, KeyError> {
        let raw = match self {
            KeySource::EnvVar { var_name } => Zeroizing::new(
                std::env::var(var_name).map_err(|_| KeyError::EnvVarNotFound(var_name.clone()))?,
            ),
            KeySource::File { path } => Zeroizing::new(std::fs::read_to_string(path)?),
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(KeyError::Empty(self.describe()));
        }
        Ok(Zeroizing::new(trimmed.to_string()))
    }

    /// Location of the secret, never its value.
    pub fn describe(&self) -> String {
        match self {
            KeySource::EnvVar { var_name } => format!("env:{var_name}"),
            KeySource::File { path } => format!("file:{}", path.display()),
        }
    }
}

/// Load a hex private key (with or without `0x`) into a local signer.
pub fn load_signer(source: &KeySource) -> Result<PrivateKeySigner, KeyError> {
    let hex_key = source.load()?;
    signer_from_hex(&hex_key)
}

fn signer_from_hex(hex_str: &str) -> Result<PrivateKeySigner, KeyError> {
    let trimmed = hex_str.trim().trim_start_matches("0x");
    let secret_bytes: Zeroizing<Vec<u8>> = Zeroizing::new(hex::decode(trimmed)?);
    PrivateKeySigner::from_slice(&secret_bytes).map_err(|e| KeyError::InvalidKey(e.to_string()))
}

/// Key management errors.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Secret is empty: {0}")]
    Empty(String),

    #[error("Failed to decode hex: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Typed data
// =============================================================================

sol! {
    #[derive(Debug)]
    struct OrderLeg {
        uint256 assetID;
        uint64 contractSize;
        uint64 limitPrice;
        bool isBuyingContract;
    }

    #[derive(Debug)]
    struct Order {
        uint64 subAccountID;
        bool isMarket;
        uint8 timeInForce;
        bool postOnly;
        bool reduceOnly;
        OrderLeg[] legs;
        uint32 nonce;
        int64 expiration;
    }
}

/// An order converted to the integer units that get signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignableOrder {
    pub sub_account_id: u64,
    pub is_market: bool,
    pub time_in_force: u8,
    pub post_only: bool,
    pub reduce_only: bool,
    pub asset_id: U256,
    /// `floor(size * 10^base_decimals)`.
    pub contract_size: u64,
    /// `floor(price * 10^9)`, zero for market orders.
    pub limit_price: u64,
    pub is_buying: bool,
    pub nonce: u32,
    pub expiration_ns: i64,
}

impl SignableOrder {
    pub fn from_intent(
        sub_account_id: &str,
        intent: &OrderIntent,
        meta: &InstrumentMeta,
        expiration_ns: i64,
    ) -> GatewayResult<Self> {
        let sub_account_id = sub_account_id
            .parse::<u64>()
            .map_err(|_| GatewayError::Signing(format!("invalid sub account id {sub_account_id}")))?;

        let contract_size = scale_floor(intent.size.0, meta.base_decimals)
            .ok_or_else(|| GatewayError::Signing(format!("size {} out of range", intent.size)))?;

        let limit_price = if intent.is_market() {
            0
        } else {
            scale_floor(intent.price.0, PRICE_DECIMALS)
                .ok_or_else(|| GatewayError::Signing(format!("price {} out of range", intent.price)))?
        };

        Ok(Self {
            sub_account_id,
            is_market: intent.is_market(),
            time_in_force: intent.time_in_force.venue_code(),
            post_only: intent.post_only,
            reduce_only: intent.reduce_only,
            asset_id: parse_asset_id(&meta.asset_id)?,
            contract_size,
            limit_price,
            is_buying: intent.is_buying(),
            nonce: intent.correlation_id.value(),
            expiration_ns,
        })
    }

    fn to_typed(&self) -> Order {
        Order {
            subAccountID: self.sub_account_id,
            isMarket: self.is_market,
            timeInForce: self.time_in_force,
            postOnly: self.post_only,
            reduceOnly: self.reduce_only,
            legs: vec![OrderLeg {
                assetID: self.asset_id,
                contractSize: self.contract_size,
                limitPrice: self.limit_price,
                isBuyingContract: self.is_buying,
            }],
            nonce: self.nonce,
            expiration: self.expiration_ns,
        }
    }
}

fn scale_floor(value: Decimal, decimals: u32) -> Option<u64> {
    let scale = 10u64.checked_pow(decimals)?;
    value.checked_mul(Decimal::from(scale))?.floor().to_u64()
}

/// Instrument hash as published by the venue: hex with `0x`, or decimal.
fn parse_asset_id(raw: &str) -> GatewayResult<U256> {
    let parsed = match raw.strip_prefix("0x") {
        Some(hex_digits) => U256::from_str_radix(hex_digits, 16),
        None => U256::from_str_radix(raw, 10),
    };
    parsed.map_err(|e| GatewayError::Signing(format!("invalid asset id {raw}: {e}")))
}

/// Signature fields as the venue expects them in the order body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSignature {
    /// Checksummed signer address.
    pub signer: String,
    /// `0x` + 64 hex chars.
    pub r: String,
    /// `0x` + 64 hex chars.
    pub s: String,
    /// 27 or 28.
    pub v: u8,
    pub expiration_ns: i64,
    pub nonce: u32,
}

impl OrderSignature {
    pub fn to_wire(&self) -> Value {
        json!({
            "s": self.signer,
            "r": self.r,
            "s1": self.s,
            "v": self.v,
            "e": self.expiration_ns.to_string(),
            "n": self.nonce,
        })
    }
}

// =============================================================================
// Signer
// =============================================================================

/// Produces order signatures. Injected into `RestGateway`.
pub trait OrderSigner: Send + Sync {
    fn address(&self) -> Address;

    fn sign_order<'a>(&'a self, order: &'a SignableOrder)
        -> BoxFuture<'a, GatewayResult<OrderSignature>>;
}

/// EIP-712 signer backed by a local private key.
pub struct Eip712OrderSigner {
    signer: PrivateKeySigner,
    chain_id: u64,
}

impl Eip712OrderSigner {
    pub fn new(signer: PrivateKeySigner, chain_id: u64) -> Self {
        Self { signer, chain_id }
    }

    pub fn from_source(source: &KeySource, chain_id: u64) -> Result<Self, KeyError> {
        Ok(Self::new(load_signer(source)?, chain_id))
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// EIP-712 signing hash of `order` under this signer's domain.
    pub fn signing_hash(&self, order: &SignableOrder) -> alloy::primitives::B256 {
        let domain = eip712_domain! {
            name: EIP712_DOMAIN_NAME,
            version: EIP712_DOMAIN_VERSION,
            chain_id: self.chain_id,
        };
        order.to_typed().eip712_signing_hash(&domain)
    }
}

impl OrderSigner for Eip712OrderSigner {
    fn address(&self) -> Address {
        self.signer.address()
    }

    fn sign_order<'a>(
        &'a self,
        order: &'a SignableOrder,
    ) -> BoxFuture<'a, GatewayResult<OrderSignature>> {
        Box::pin(async move {
            let hash = self.signing_hash(order);
            // NOTE: Do not log signature material
            let sig = self
                .signer
                .sign_hash(&hash)
                .await
                .map_err(|e| GatewayError::Signing(e.to_string()))?;

            Ok(OrderSignature {
                signer: self.signer.address().to_checksum(None),
                r: format!("0x{}", hex::encode(sig.r().to_be_bytes::<32>())),
                s: format!("0x{}", hex::encode(sig.s().to_be_bytes::<32>())),
                v: 27 + u8::from(sig.v()),
                expiration_ns: order.expiration_ns,
                nonce: order.nonce,
            })
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
