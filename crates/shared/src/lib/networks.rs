//! Network registry: genesis timing, fork schedules and era file naming.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use thiserror::Error;

/// Slots covered by one era file.
pub const SLOTS_PER_HISTORICAL_ROOT: u64 = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Fork {
    Phase0,
    Altair,
    Bellatrix,
    Capella,
    Deneb,
    Electra,
}

impl Fork {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phase0 => "phase0",
            Self::Altair => "altair",
            Self::Bellatrix => "bellatrix",
            Self::Capella => "capella",
            Self::Deneb => "deneb",
            Self::Electra => "electra",
        }
    }
}

impl fmt::Display for Fork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum NetworkParseError {
    #[error("unknown network {0}")]
    UnknownNetwork(String),

    #[error("filename {0} does not match <network>-<5-digit era>-<8-hex root>.era")]
    BadFilename(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Mainnet,
    Gnosis,
    Sepolia,
}

pub struct NetworkConfig {
    pub genesis_time: u64,
    pub seconds_per_slot: u64,
    pub slots_per_epoch: u64,
    pub slots_per_historical_root: u64,
    /// Fork activation epochs, ascending.
    pub fork_epochs: &'static [(Fork, u64)],
}

const MAINNET: NetworkConfig = NetworkConfig {
    genesis_time: 1_606_824_023,
    seconds_per_slot: 12,
    slots_per_epoch: 32,
    slots_per_historical_root: SLOTS_PER_HISTORICAL_ROOT,
    fork_epochs: &[
        (Fork::Phase0, 0),
        (Fork::Altair, 74_240),
        (Fork::Bellatrix, 144_896),
        (Fork::Capella, 194_048),
        (Fork::Deneb, 269_568),
        (Fork::Electra, 364_032),
    ],
};

const GNOSIS: NetworkConfig = NetworkConfig {
    genesis_time: 1_638_993_340,
    seconds_per_slot: 5,
    slots_per_epoch: 16,
    slots_per_historical_root: SLOTS_PER_HISTORICAL_ROOT,
    fork_epochs: &[
        (Fork::Phase0, 0),
        (Fork::Altair, 512),
        (Fork::Bellatrix, 385_536),
        (Fork::Capella, 648_704),
        (Fork::Deneb, 889_856),
        (Fork::Electra, 1_337_856),
    ],
};

const SEPOLIA: NetworkConfig = NetworkConfig {
    genesis_time: 1_655_733_600,
    seconds_per_slot: 12,
    slots_per_epoch: 32,
    slots_per_historical_root: SLOTS_PER_HISTORICAL_ROOT,
    fork_epochs: &[
        (Fork::Phase0, 0),
        (Fork::Altair, 50),
        (Fork::Bellatrix, 100),
        (Fork::Capella, 56_832),
        (Fork::Deneb, 132_608),
        (Fork::Electra, 222_464),
    ],
};

impl Network {
    pub const ALL: [Network; 3] = [Network::Mainnet, Network::Gnosis, Network::Sepolia];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Gnosis => "gnosis",
            Self::Sepolia => "sepolia",
        }
    }

    pub fn config(&self) -> &'static NetworkConfig {
        match self {
            Self::Mainnet => &MAINNET,
            Self::Gnosis => &GNOSIS,
            Self::Sepolia => &SEPOLIA,
        }
    }

    /// Highest fork whose activation epoch is at or below the slot's epoch.
    pub fn fork_for(&self, slot: u64) -> Fork {
        let config = self.config();
        let epoch = slot / config.slots_per_epoch;
        let mut current = Fork::Phase0;
        for (fork, activation_epoch) in config.fork_epochs {
            if *activation_epoch <= epoch {
                current = *fork;
            }
        }
        current
    }

    /// Wall-clock timestamp of a slot, derived from genesis timing.
    pub fn timestamp_for(&self, slot: u64) -> u64 {
        let config = self.config();
        config.genesis_time + slot * config.seconds_per_slot
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = NetworkParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "gnosis" => Ok(Self::Gnosis),
            "sepolia" => Ok(Self::Sepolia),
            other => Err(NetworkParseError::UnknownNetwork(other.to_string())),
        }
    }
}

/// Inclusive slot range covered by an era.
pub fn era_slot_range(era_number: u64) -> RangeInclusive<u64> {
    let start = era_number * SLOTS_PER_HISTORICAL_ROOT;
    start..=start + SLOTS_PER_HISTORICAL_ROOT - 1
}

/// Era number covering a slot.
pub fn era_for_slot(slot: u64) -> u64 {
    slot / SLOTS_PER_HISTORICAL_ROOT
}

/// Case-insensitive substring match against the known network names, in
/// declaration order.
pub fn detect_network(filename: &str) -> Option<Network> {
    let lowered = filename.to_lowercase();
    Network::ALL.into_iter().find(|n| lowered.contains(n.as_str()))
}

/// A parsed `<network>-<5-digit era>-<8-hex root>.era` name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EraFileName {
    pub network: Network,
    pub era_number: u64,
    pub short_root: String,
}

impl fmt::Display for EraFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{:05}-{}.era",
            self.network.as_str(),
            self.era_number,
            self.short_root
        )
    }
}

impl FromStr for EraFileName {
    type Err = NetworkParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let bad = || NetworkParseError::BadFilename(value.to_string());
        let stem = value.strip_suffix(".era").ok_or_else(bad)?;
        // The era and root tokens are fixed-width; the network token may
        // itself contain dashes, so split from the right.
        let (rest, short_root) = stem.rsplit_once('-').ok_or_else(bad)?;
        let (network_token, era_token) = rest.rsplit_once('-').ok_or_else(bad)?;
        if era_token.len() != 5 || !era_token.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        if short_root.len() != 8 || !short_root.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(bad());
        }
        let network = detect_network(network_token).ok_or_else(bad)?;
        let era_number = era_token.parse().map_err(|_| bad())?;
        Ok(Self {
            network,
            era_number,
            short_root: short_root.to_lowercase(),
        })
    }
}
