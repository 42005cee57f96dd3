use std::env;
use std::fmt::Debug;
use std::str::FromStr;

#[derive(Clone, Copy)]
pub struct EnvVarSpec {
    pub key: &'static str,
    pub sensitive: bool,
}

#[derive(Clone)]
pub struct EnvVarValue<TVal> {
    pub spec: &'static EnvVarSpec,
    pub value: TVal,
}

impl EnvVarSpec {
    pub fn default<TVal: FromStr>(&'static self, default: TVal) -> EnvVarValue<TVal> {
        let as_optional = self.optional();
        EnvVarValue {
            spec: as_optional.spec,
            value: as_optional.value.unwrap_or(default),
        }
    }

    pub fn optional<TVal: FromStr>(&'static self) -> EnvVarValue<Option<TVal>> {
        let value = match env::var(self.key) {
            Ok(val) => {
                let parsed = val
                    .parse()
                    .unwrap_or_else(|_e| panic!("Failed to parse env var {}", self.key));
                Some(parsed)
            }
            Err(e) => {
                tracing::debug!("Failed reading env var {}: {e:?}", self.key);
                None
            }
        };
        EnvVarValue { spec: self, value }
    }

    pub fn required<TVal: FromStr>(&'static self) -> EnvVarValue<TVal> {
        let raw_value = env::var(self.key).unwrap_or_else(|e| panic!("Failed to read env var {}: {e:?}", self.key));
        match raw_value.parse() {
            Ok(value) => EnvVarValue { spec: self, value },
            Err(_e) => {
                panic!("Failed to parse value {} for env var {}", raw_value, self.key)
            }
        }
    }
}

impl<TVal: Debug> Debug for EnvVarValue<TVal> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.spec.sensitive {
            f.write_str("***")
        } else {
            f.write_fmt(format_args!("{:?}", self.value))
        }
    }
}

pub const LOG_FORMAT: EnvVarSpec = EnvVarSpec {
    key: "LOG_FORMAT",
    sensitive: false,
};
pub const PROMETHEUS_NAMESPACE: EnvVarSpec = EnvVarSpec {
    key: "PROMETHEUS_NAMESPACE",
    sensitive: false,
};

pub const ERA_BASE_URL: EnvVarSpec = EnvVarSpec {
    key: "ERA_BASE_URL",
    sensitive: false,
};
pub const ERA_DOWNLOAD_DIR: EnvVarSpec = EnvVarSpec {
    key: "ERA_DOWNLOAD_DIR",
    sensitive: false,
};
pub const ERA_CLEANUP_AFTER_PROCESS: EnvVarSpec = EnvVarSpec {
    key: "ERA_CLEANUP_AFTER_PROCESS",
    sensitive: false,
};
pub const ERA_MAX_RETRIES: EnvVarSpec = EnvVarSpec {
    key: "ERA_MAX_RETRIES",
    sensitive: false,
};
pub const ERA_MAX_CONCURRENT_DOWNLOADS: EnvVarSpec = EnvVarSpec {
    key: "ERA_MAX_CONCURRENT_DOWNLOADS",
    sensitive: false,
};
pub const ERA_BLOCK_ERROR_TOLERANCE: EnvVarSpec = EnvVarSpec {
    key: "ERA_BLOCK_ERROR_TOLERANCE",
    sensitive: false,
};
pub const BATCH_SIZE: EnvVarSpec = EnvVarSpec {
    key: "BATCH_SIZE",
    sensitive: false,
};

pub const CLICKHOUSE_HOST: EnvVarSpec = EnvVarSpec {
    key: "CLICKHOUSE_HOST",
    sensitive: false,
};
pub const CLICKHOUSE_PORT: EnvVarSpec = EnvVarSpec {
    key: "CLICKHOUSE_PORT",
    sensitive: false,
};
pub const CLICKHOUSE_USER: EnvVarSpec = EnvVarSpec {
    key: "CLICKHOUSE_USER",
    sensitive: false,
};
pub const CLICKHOUSE_PASSWORD: EnvVarSpec = EnvVarSpec {
    key: "CLICKHOUSE_PASSWORD",
    sensitive: true,
};
pub const CLICKHOUSE_DATABASE: EnvVarSpec = EnvVarSpec {
    key: "CLICKHOUSE_DATABASE",
    sensitive: false,
};
pub const CLICKHOUSE_SECURE: EnvVarSpec = EnvVarSpec {
    key: "CLICKHOUSE_SECURE",
    sensitive: false,
};
