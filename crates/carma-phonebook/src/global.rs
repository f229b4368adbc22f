//! Network-wide parameters shared by every node of an epoch

use crate::error::{PhonebookError, Result};
use crate::record::hex_bytes;
use carma_protocol::{NodeCount, Psn, WireParams};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub correctness_test_only: bool,
    pub corruption_rate: f64,
    #[serde(with = "hex_bytes")]
    pub epoch_nonce: Vec<u8>,
    pub num_clients: NodeCount,
    pub num_servers: NodeCount,
    #[serde(with = "decimal")]
    pub prime: BigUint,
    pub privacy_failure_rate: f64,
    pub robustness_failure_rate: f64,
    pub shamir_threshold: NodeCount,
    pub rigid: bool,
    pub num_buckets: NodeCount,
    pub min_mc_size: NodeCount,
    pub num_routing_layers: NodeCount,
    pub num_per_rs_layer: NodeCount,
    pub num_parallel_msgs_for_registration: NodeCount,
    pub num_parallel_msgs_for_routing: NodeCount,
    pub mixsize: NodeCount,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        GlobalConfig {
            correctness_test_only: false,
            corruption_rate: 0.0,
            epoch_nonce: vec![0u8; 32],
            num_clients: 0,
            num_servers: 3,
            // 2^127 - 1
            prime: (BigUint::from(1u8) << 127usize) - BigUint::from(1u8),
            privacy_failure_rate: 0.0,
            robustness_failure_rate: 0.0,
            shamir_threshold: 1,
            rigid: true,
            num_buckets: 1,
            min_mc_size: 1,
            num_routing_layers: 0,
            num_per_rs_layer: 0,
            num_parallel_msgs_for_registration: 1,
            num_parallel_msgs_for_routing: 1,
            mixsize: 1,
        }
    }
}

impl GlobalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.shamir_threshold < 1 {
            return Err(PhonebookError::Config(
                "shamir_threshold must be at least 1".to_string(),
            ));
        }
        if self.num_servers < self.shamir_threshold.saturating_add(2) {
            return Err(PhonebookError::Config(format!(
                "num_servers ({}) must be at least shamir_threshold + 2 ({})",
                self.num_servers,
                self.shamir_threshold.saturating_add(2)
            )));
        }
        if self.num_buckets < 1 {
            return Err(PhonebookError::Config("num_buckets must be at least 1".to_string()));
        }
        if self.min_mc_size < 1 {
            return Err(PhonebookError::Config("min_mc_size must be at least 1".to_string()));
        }
        if self.prime < BigUint::from(2u8) {
            return Err(PhonebookError::Config("prime must be at least 2".to_string()));
        }
        if self.prime_size() == 0 {
            return Err(PhonebookError::Config(format!(
                "prime {} has no encodable width",
                self.prime
            )));
        }
        Ok(())
    }

    /// Width in bytes of every encoded mix value
    pub fn prime_size(&self) -> usize {
        let bits = self.prime.bits();
        ((bits + 7) / 8) as usize
    }

    pub fn wire_params(&self) -> WireParams {
        WireParams::new(self.prime_size(), self.mixsize as usize)
    }

    pub fn bucket_of(&self, psn: &Psn) -> Result<NodeCount> {
        Ok(carma_crypto::bucket_of(&self.epoch_nonce, psn, self.num_buckets)?)
    }
}

mod decimal {
    use num_bigint::BigUint;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BigUint, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BigUint::parse_bytes(s.as_bytes(), 10)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid decimal integer: {:?}", s)))
    }
}
