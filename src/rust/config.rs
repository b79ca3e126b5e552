// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    network::{
        config::{
            SynCacheConfig,
            TcpConfig,
        },
        consts::{
            MAX_MSS,
            MIN_MSS,
            SLOW_HZ,
        },
    },
};
use ::std::{
    fs::File,
    io::Read,
    ops::Index,
    str::FromStr,
};
use ::yaml_rust::{
    Yaml,
    YamlLoader,
};

//======================================================================================================================
// Constants
//======================================================================================================================

// Receive-side TCP options. Every key is optional and may be overridden by an upper-case environment variable.
mod tcp_config {
    pub const SECTION_NAME: &str = "tcp_input";
    pub const MSS: &str = "tcp_mss";
    pub const DEFAULT_MSS: &str = "tcp_default_mss";
    pub const INIT_WIN: &str = "tcp_init_win";
    pub const INIT_WIN_LOCAL: &str = "tcp_init_win_local";
    pub const KEEP_INIT_SECS: &str = "tcp_keep_init_secs";
    pub const KEEP_IDLE_SECS: &str = "tcp_keep_idle_secs";
    pub const MSL_SECS: &str = "tcp_msl_secs";
    pub const REXMT_THRESH: &str = "tcp_rexmt_thresh";
    pub const PAWS_IDLE_SECS: &str = "tcp_paws_idle_secs";
    pub const ACK_DROP_PPSLIM: &str = "tcp_ackdrop_ppslim";
    pub const RST_PPSLIM: &str = "tcp_rst_ppslim";
    pub const RFC1323: &str = "tcp_rfc1323";
    pub const SACK: &str = "tcp_sack";
    pub const ECN: &str = "tcp_ecn";
    pub const ACK_ON_PUSH: &str = "tcp_ack_on_push";
    pub const ABC: &str = "tcp_abc";
    pub const ABC_AGGRESSIVE: &str = "tcp_abc_aggressive";
    pub const SB_MAX: &str = "tcp_sb_max";
    pub const REASS_LIMIT: &str = "tcp_reass_limit";
    pub const CONGESTION_CONTROL: &str = "tcp_congestion_control";
}

// SYN cache dimensions.
mod syn_cache_config {
    pub const SECTION_NAME: &str = "syn_cache";
    pub const HASH_SIZE: &str = "syncache_hash_size";
    pub const BUCKET_LIMIT: &str = "syncache_bucket_limit";
    pub const CACHE_LIMIT: &str = "syncache_cache_limit";
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Engine configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Yaml);

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Config {
    /// Reads a configuration file into a [Config] object.
    pub fn new(config_path: &str) -> Result<Self, Fail> {
        let mut config_s: String = String::new();
        File::open(config_path)?.read_to_string(&mut config_s)?;
        Self::from_str(&config_s)
    }

    /// Parses a configuration document.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(config_s: &str) -> Result<Self, Fail> {
        let config: Vec<Yaml> = YamlLoader::load_from_str(config_s)?;
        match &config[..] {
            [c] => Ok(Self(c.clone())),
            _ => Err(Fail::new(libc::EINVAL, "Wrong number of config objects")),
        }
    }

    /// Builds the [TcpConfig] from the "tcp_input" section. Missing options keep their defaults.
    pub fn tcp_config(&self) -> Result<TcpConfig, Fail> {
        let section: Option<&Yaml> = self.get_optional_subsection(tcp_config::SECTION_NAME)?;
        let mut config: TcpConfig = TcpConfig::default();

        if let Some(mss) = Self::get_int_option::<usize>(section, tcp_config::MSS)? {
            if !(MIN_MSS..=MAX_MSS).contains(&mss) {
                let cause: String = format!("invalid mss ({:?})", mss);
                error!("tcp_config(): {}", cause);
                return Err(Fail::new(libc::ERANGE, &cause));
            }
            config = config.set_advertised_mss(mss);
        }
        if let Some(mss) = Self::get_int_option::<u16>(section, tcp_config::DEFAULT_MSS)? {
            if mss == 0 {
                return Err(Fail::new(libc::ERANGE, "default mss must be positive"));
            }
            config = config.set_default_mss(mss as usize);
        }

        let init_win: Option<u32> = Self::get_positive_option(section, tcp_config::INIT_WIN)?;
        let init_win_local: Option<u32> = Self::get_positive_option(section, tcp_config::INIT_WIN_LOCAL)?;
        if init_win.is_some() || init_win_local.is_some() {
            let remote: u32 = init_win.unwrap_or(config.get_init_win());
            let local: u32 = init_win_local.unwrap_or(config.get_init_win_local());
            config = config.set_init_win(remote, local);
        }

        if let Some(secs) = Self::get_positive_option::<u64>(section, tcp_config::KEEP_INIT_SECS)? {
            config = config.set_keep_init(secs.saturating_mul(SLOW_HZ));
        }
        if let Some(secs) = Self::get_positive_option::<u64>(section, tcp_config::KEEP_IDLE_SECS)? {
            config = config.set_keep_idle(secs.saturating_mul(SLOW_HZ));
        }
        if let Some(secs) = Self::get_positive_option::<u64>(section, tcp_config::MSL_SECS)? {
            config = config.set_msl(secs.saturating_mul(SLOW_HZ));
        }
        if let Some(thresh) = Self::get_positive_option::<u32>(section, tcp_config::REXMT_THRESH)? {
            config = config.set_rexmt_thresh(thresh);
        }
        if let Some(secs) = Self::get_int_option::<u64>(section, tcp_config::PAWS_IDLE_SECS)? {
            config = config.set_paws_idle(secs.saturating_mul(SLOW_HZ));
        }

        let ack_drop: Option<i32> = Self::get_int_option(section, tcp_config::ACK_DROP_PPSLIM)?;
        let rst: Option<i32> = Self::get_int_option(section, tcp_config::RST_PPSLIM)?;
        if ack_drop.is_some() || rst.is_some() {
            let ack_drop: i32 = ack_drop.unwrap_or(config.get_ack_drop_ppslim());
            let rst: i32 = rst.unwrap_or(config.get_rst_ppslim());
            config = config.set_ppslim(ack_drop, rst);
        }

        if let Some(value) = Self::get_bool_option(section, tcp_config::RFC1323)? {
            config = config.set_rfc1323(value);
        }
        if let Some(value) = Self::get_bool_option(section, tcp_config::SACK)? {
            config = config.set_sack(value);
        }
        if let Some(value) = Self::get_bool_option(section, tcp_config::ECN)? {
            config = config.set_ecn(value);
        }
        if let Some(value) = Self::get_bool_option(section, tcp_config::ACK_ON_PUSH)? {
            config = config.set_ack_on_push(value);
        }
        let abc: Option<bool> = Self::get_bool_option(section, tcp_config::ABC)?;
        let abc_aggressive: Option<bool> = Self::get_bool_option(section, tcp_config::ABC_AGGRESSIVE)?;
        if abc.is_some() || abc_aggressive.is_some() {
            let enabled: bool = abc.unwrap_or(config.get_abc());
            let aggressive: bool = abc_aggressive.unwrap_or(config.get_abc_aggressive());
            config = config.set_abc(enabled, aggressive);
        }

        if let Some(sb_max) = Self::get_int_option::<u32>(section, tcp_config::SB_MAX)? {
            if sb_max < MIN_MSS as u32 {
                let cause: String = format!("socket buffer limit too small ({:?})", sb_max);
                error!("tcp_config(): {}", cause);
                return Err(Fail::new(libc::ERANGE, &cause));
            }
            config = config.set_sb_max(sb_max);
        }
        if let Some(limit) = Self::get_positive_option::<usize>(section, tcp_config::REASS_LIMIT)? {
            config = config.set_reass_limit(limit);
        }
        if let Some(name) = Self::get_str_option(section, tcp_config::CONGESTION_CONTROL)? {
            config = config.set_congestion_control(&name);
        }

        Ok(config)
    }

    /// Builds the [SynCacheConfig] from the "syn_cache" section. Missing options keep their defaults.
    pub fn syn_cache_config(&self) -> Result<SynCacheConfig, Fail> {
        let section: Option<&Yaml> = self.get_optional_subsection(syn_cache_config::SECTION_NAME)?;
        let hash_size: Option<usize> = Self::get_positive_option(section, syn_cache_config::HASH_SIZE)?;
        let bucket_limit: Option<usize> = Self::get_positive_option(section, syn_cache_config::BUCKET_LIMIT)?;
        let cache_limit: Option<usize> = Self::get_positive_option(section, syn_cache_config::CACHE_LIMIT)?;
        Ok(SynCacheConfig::new(hash_size, bucket_limit, cache_limit))
    }

    /// Looks up a section that may be absent from the document.
    fn get_optional_subsection(&self, index: &str) -> Result<Option<&Yaml>, Fail> {
        match self.0.index(index) {
            Yaml::BadValue | Yaml::Null => Ok(None),
            section @ Yaml::Hash(_) => Ok(Some(section)),
            _ => {
                let message: String = format!("parameter \"{}\" has unexpected type", index);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
        }
    }

    /// Index `yaml` to find the value at `index`, if present.
    fn get_option<'a>(yaml: Option<&'a Yaml>, index: &str) -> Option<&'a Yaml> {
        match yaml.map(|yaml| yaml.index(index)) {
            None | Some(Yaml::BadValue) => None,
            value => value,
        }
    }

    /// Reads `index` from the environment variable first and then from `yaml`, validating its type with `receiver`.
    fn get_typed_option<'a, T, Fn>(yaml: Option<&'a Yaml>, index: &str, receiver: Fn) -> Result<Option<T>, Fail>
    where
        T: FromStr,
        Fn: FnOnce(&'a Yaml) -> Option<T>,
    {
        if let Some(value) = Self::get_typed_env_option(index)? {
            return Ok(Some(value));
        }
        match Self::get_option(yaml, index) {
            None => Ok(None),
            Some(option) => match receiver(option) {
                Some(value) => Ok(Some(value)),
                None => {
                    let message: String = format!("parameter {} has unexpected type", index);
                    Err(Fail::new(libc::EINVAL, message.as_str()))
                },
            },
        }
    }

    /// Reads the upper-case environment variable named after `index`.
    fn get_typed_env_option<T: FromStr>(index: &str) -> Result<Option<T>, Fail> {
        if let Ok(var) = ::std::env::var(index.to_uppercase()) {
            if let Ok(value) = var.as_str().parse() {
                return Ok(Some(value));
            } else {
                let message: String = format!("parameter {} has unexpected type", index);
                return Err(Fail::new(libc::EINVAL, message.as_str()));
            }
        }
        Ok(None)
    }

    /// Same as `get_typed_option` using `Yaml::as_i64` as the receiver, additionally verifying that the destination
    /// type may hold the value.
    fn get_int_option<T: FromStr + TryFrom<i64>>(yaml: Option<&Yaml>, index: &str) -> Result<Option<T>, Fail> {
        let mut out_of_range: bool = false;
        let value: Result<Option<T>, Fail> = Self::get_typed_option(yaml, index, |option: &Yaml| {
            let value: i64 = option.as_i64()?;
            match T::try_from(value) {
                Ok(value) => Some(value),
                Err(_) => {
                    out_of_range = true;
                    None
                },
            }
        });
        match value {
            Err(_) if out_of_range => {
                let message: String = format!("parameter \"{}\" is out of range", index);
                Err(Fail::new(libc::ERANGE, message.as_str()))
            },
            value => value,
        }
    }

    /// Same as `get_int_option` but rejects zero.
    fn get_positive_option<T>(yaml: Option<&Yaml>, index: &str) -> Result<Option<T>, Fail>
    where
        T: FromStr + TryFrom<i64> + Default + PartialEq,
    {
        match Self::get_int_option::<T>(yaml, index)? {
            Some(value) if value == T::default() => {
                let message: String = format!("parameter \"{}\" must be positive", index);
                Err(Fail::new(libc::ERANGE, message.as_str()))
            },
            value => Ok(value),
        }
    }

    fn get_bool_option(yaml: Option<&Yaml>, index: &str) -> Result<Option<bool>, Fail> {
        Self::get_typed_option(yaml, index, Yaml::as_bool)
    }

    fn get_str_option(yaml: Option<&Yaml>, index: &str) -> Result<Option<String>, Fail> {
        Self::get_typed_option(yaml, index, |option: &Yaml| option.as_str().map(str::to_string))
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
