#![allow(dead_code)]

use custodian::config::{GlobalConfig, RawConfigFile, RawJobConfig, RawWatchConfig};

/// Builder for `GlobalConfig` to simplify test setup.
///
/// Goes through `RawConfigFile` and the same validation the loader uses.
pub struct ConfigBuilder {
    config: RawConfigFile,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_job(mut self, name: &str, job: RawJobConfig) -> Self {
        self.config.schedule.insert(name.to_string(), job);
        self
    }

    pub fn with_watch(mut self, name: &str, watch: RawWatchConfig) -> Self {
        self.config.watch.insert(name.to_string(), watch);
        self
    }

    pub fn email(mut self, addr: &str) -> Self {
        self.config.email = Some(addr.to_string());
        self
    }

    pub fn rate_limit(mut self, seconds: f64) -> Self {
        self.config.rate_limit = Some(seconds);
        self
    }

    pub fn check_interval_ms(mut self, ms: u64) -> Self {
        self.config.check_interval = Some(ms as f64);
        self
    }

    pub fn after_on_failure(mut self, val: bool) -> Self {
        self.config.after_on_failure = Some(val);
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.config.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> GlobalConfig {
        GlobalConfig::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `RawJobConfig`.
pub struct JobBuilder {
    job: RawJobConfig,
}

impl JobBuilder {
    pub fn new(cmd: &str, when: &str) -> Self {
        Self {
            job: RawJobConfig {
                cmd: Some(cmd.to_string()),
                when: when.to_string(),
                ..RawJobConfig::default()
            },
        }
    }

    /// A job whose `cmd` key is absent.
    pub fn without_cmd(when: &str) -> Self {
        Self {
            job: RawJobConfig {
                when: when.to_string(),
                ..RawJobConfig::default()
            },
        }
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.job.args.push(arg.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.job.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn cwd(mut self, dir: &str) -> Self {
        self.job.cwd = Some(dir.into());
        self
    }

    pub fn output(mut self, path: &str) -> Self {
        self.job.output = Some(path.into());
        self
    }

    pub fn maxtime(mut self, limit: &str) -> Self {
        self.job.maxtime = Some(limit.to_string());
        self
    }

    pub fn build(self) -> RawJobConfig {
        self.job
    }
}

/// Builder for `RawWatchConfig`.
pub struct WatchBuilder {
    watch: RawWatchConfig,
}

impl WatchBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            watch: RawWatchConfig {
                cmd: Some(cmd.to_string()),
                ..RawWatchConfig::default()
            },
        }
    }

    pub fn notify(mut self, val: bool) -> Self {
        self.watch.notify = val;
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.watch.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn output(mut self, path: &str) -> Self {
        self.watch.output = Some(path.into());
        self
    }

    pub fn mem_limit(mut self, limit: &str) -> Self {
        self.watch.mem_limit = Some(limit.to_string());
        self
    }

    pub fn build(self) -> RawWatchConfig {
        self.watch
    }
}
