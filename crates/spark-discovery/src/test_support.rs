//! 单元测试共用的探针资源类型。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::config::{Config, keys};
use crate::error::{BoxError, DiscoveryError};
use crate::record::Record;
use crate::resource::ResourceType;

pub(crate) const PROBE: &str = "probe";

/// 记录建连/断开次数，可按需注入失败。
#[derive(Clone, Default)]
pub(crate) struct Probe {
    pub connects: Arc<AtomicUsize>,
    pub disconnects: Arc<AtomicUsize>,
    pub fail_connect: Arc<AtomicBool>,
    pub fail_disconnect: Arc<AtomicBool>,
}

#[derive(Debug)]
pub(crate) struct ProbeClient {
    pub serial: usize,
    pub host: String,
}

impl Probe {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl ResourceType for Probe {
    type Target = String;
    type Client = ProbeClient;

    fn type_name(&self) -> &str {
        PROBE
    }

    fn resolve(&self, record: &Record, merged: &Config) -> Result<String, DiscoveryError> {
        merged
            .require_str(keys::HOST)
            .map(str::to_owned)
            .map_err(|err| DiscoveryError::invalid_record(PROBE, record.name(), err))
    }

    fn identity(&self, host: &String) -> Config {
        Config::new().with(keys::HOST, host.as_str())
    }

    fn connect(&self, host: &String) -> Result<ProbeClient, BoxError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err("probe refused".into());
        }
        let serial = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ProbeClient {
            serial,
            host: host.clone(),
        })
    }

    fn disconnect(&self, _: &ProbeClient) -> Result<(), BoxError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err("probe already closed".into());
        }
        Ok(())
    }
}

pub(crate) fn probe_record(name: &str) -> Record {
    Record::new(name, PROBE).with_location(keys::HOST, "svc.local")
}
