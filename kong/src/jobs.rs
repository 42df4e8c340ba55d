//! Every job the pipeline runs, as one closed enum tagged by job name.

use std::str::FromStr;

use derive_more::Display;
use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::evmlogs::EvmLog;
use crate::outputs::Output;
use crate::snapshots::Snapshot;
use crate::sources::Source;
use crate::things::{Thing, WithdrawalQueue};
use crate::webhooks::Subscription;
use crate::ChainId;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    #[display("fanout")]
    Fanout,
    #[display("extract")]
    Extract,
    #[display("compute")]
    Compute,
    #[display("load")]
    Load,
    #[display("probe")]
    Probe,
}

impl QueueName {
    pub const ALL: [QueueName; 5] = [
        QueueName::Fanout,
        QueueName::Extract,
        QueueName::Compute,
        QueueName::Load,
        QueueName::Probe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Fanout => "fanout",
            QueueName::Extract => "extract",
            QueueName::Compute => "compute",
            QueueName::Load => "load",
            QueueName::Probe => "probe",
        }
    }
}

impl FromStr for QueueName {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        QueueName::ALL
            .into_iter()
            .find(|queue| queue.as_str() == name.trim())
            .ok_or_else(|| format!("unknown queue {name:?}"))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultTarget {
    pub chain_id: ChainId,
    pub address: Address,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyTarget {
    pub chain_id: ChainId,
    pub address: Address,
    pub vault_address: Address,
}

/// One stride of logs for one address
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmLogsTarget {
    pub chain_id: ChainId,
    pub address: Address,
    /// Event signatures (topic0) to fetch
    pub events: Vec<H256>,
    pub from: u64,
    pub to: u64,
    /// Abi path of the decoder
    pub handler: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotTarget {
    pub chain_id: ChainId,
    pub address: Address,
    pub abi_path: String,
}

/// Also the body posted to the subscriber
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookTarget {
    pub abi_path: String,
    pub chain_id: ChainId,
    pub block_number: u64,
    pub block_time: u64,
    pub subscription: Subscription,
    pub targets: Vec<Address>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeTarget {
    pub chain_id: ChainId,
    pub address: Address,
    /// Start of the time bucket, unix seconds
    pub time: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Batch<T> {
    pub batch: Vec<T>,
}

impl<T> Batch<T> {
    pub fn new(batch: Vec<T>) -> Self {
        Self { batch }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data")]
pub enum Job {
    #[serde(rename = "fanout.abis")]
    FanoutAbis {},
    #[serde(rename = "fanout.events")]
    FanoutEvents(Source),
    #[serde(rename = "fanout.timeseries")]
    FanoutTimeseries(Source),

    #[serde(rename = "extract.vault")]
    ExtractVault(VaultTarget),
    #[serde(rename = "extract.strategy")]
    ExtractStrategy(StrategyTarget),
    #[serde(rename = "extract.evmlogs")]
    ExtractEvmLogs(EvmLogsTarget),
    #[serde(rename = "extract.snapshot")]
    ExtractSnapshot(SnapshotTarget),
    #[serde(rename = "extract.webhook")]
    ExtractWebhook(WebhookTarget),

    #[serde(rename = "compute.tvl")]
    ComputeTvl(ComputeTarget),
    #[serde(rename = "compute.apy")]
    ComputeApy(ComputeTarget),
    #[serde(rename = "compute.harvestApr")]
    ComputeHarvestApr(ComputeTarget),

    #[serde(rename = "load.vault")]
    LoadVault(Thing),
    #[serde(rename = "load.erc20")]
    LoadErc20(Thing),
    #[serde(rename = "load.strategy")]
    LoadStrategy(Thing),
    #[serde(rename = "load.thing")]
    LoadThing(Thing),
    #[serde(rename = "load.withdrawalQueue")]
    LoadWithdrawalQueue(WithdrawalQueue),
    #[serde(rename = "load.snapshot")]
    LoadSnapshot(Snapshot),
    #[serde(rename = "load.evmlog")]
    LoadEvmLog(Batch<EvmLog>),
    #[serde(rename = "load.output")]
    LoadOutput(Batch<Output>),

    #[serde(rename = "probe")]
    Probe {},
    #[serde(rename = "monitor.failed")]
    MonitorFailed {},
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::FanoutAbis {} => "fanout.abis",
            Job::FanoutEvents(_) => "fanout.events",
            Job::FanoutTimeseries(_) => "fanout.timeseries",
            Job::ExtractVault(_) => "extract.vault",
            Job::ExtractStrategy(_) => "extract.strategy",
            Job::ExtractEvmLogs(_) => "extract.evmlogs",
            Job::ExtractSnapshot(_) => "extract.snapshot",
            Job::ExtractWebhook(_) => "extract.webhook",
            Job::ComputeTvl(_) => "compute.tvl",
            Job::ComputeApy(_) => "compute.apy",
            Job::ComputeHarvestApr(_) => "compute.harvestApr",
            Job::LoadVault(_) => "load.vault",
            Job::LoadErc20(_) => "load.erc20",
            Job::LoadStrategy(_) => "load.strategy",
            Job::LoadThing(_) => "load.thing",
            Job::LoadWithdrawalQueue(_) => "load.withdrawalQueue",
            Job::LoadSnapshot(_) => "load.snapshot",
            Job::LoadEvmLog(_) => "load.evmlog",
            Job::LoadOutput(_) => "load.output",
            Job::Probe {} => "probe",
            Job::MonitorFailed {} => "monitor.failed",
        }
    }

    pub fn queue(&self) -> QueueName {
        match self {
            Job::FanoutAbis {} | Job::FanoutEvents(_) | Job::FanoutTimeseries(_) => {
                QueueName::Fanout
            }
            Job::ExtractVault(_)
            | Job::ExtractStrategy(_)
            | Job::ExtractEvmLogs(_)
            | Job::ExtractSnapshot(_)
            | Job::ExtractWebhook(_) => QueueName::Extract,
            Job::ComputeTvl(_) | Job::ComputeApy(_) | Job::ComputeHarvestApr(_) => {
                QueueName::Compute
            }
            Job::LoadVault(_)
            | Job::LoadErc20(_)
            | Job::LoadStrategy(_)
            | Job::LoadThing(_)
            | Job::LoadWithdrawalQueue(_)
            | Job::LoadSnapshot(_)
            | Job::LoadEvmLog(_)
            | Job::LoadOutput(_) => QueueName::Load,
            Job::Probe {} | Job::MonitorFailed {} => QueueName::Probe,
        }
    }

    /// Splits into the `(name, payload)` pair queues store
    pub fn to_parts(&self) -> Result<(&'static str, Value), serde_json::Error> {
        let mut tagged = serde_json::to_value(self)?;
        let payload = tagged
            .get_mut("data")
            .map(Value::take)
            .unwrap_or_else(|| json!({}));

        Ok((self.name(), payload))
    }

    /// Rebuilds a job from a stored pair; unknown names and payloads that do
    /// not fit the name's schema are both rejected.
    pub fn from_parts(name: &str, payload: Value) -> Result<Self, String> {
        serde_json::from_value(json!({ "name": name, "data": payload }))
            .map_err(|error| format!("{name}: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn one_of_each() -> Vec<Job> {
        let address = Address::repeat_byte(0xab);
        let source = Source::new(1, address, "yearn/3/vault").incepted(100, 1_700_000_000);
        let thing = Thing::new(1, address, "vault").with_default("apiVersion", "3.0.2");
        let compute = ComputeTarget {
            chain_id: 1,
            address,
            time: 1_700_006_400,
        };

        vec![
            Job::FanoutAbis {},
            Job::FanoutEvents(source.clone()),
            Job::FanoutTimeseries(source),
            Job::ExtractVault(VaultTarget { chain_id: 1, address }),
            Job::ExtractStrategy(StrategyTarget {
                chain_id: 1,
                address,
                vault_address: Address::repeat_byte(0xcd),
            }),
            Job::ExtractEvmLogs(EvmLogsTarget {
                chain_id: 1,
                address,
                events: vec![H256::repeat_byte(0x11)],
                from: 100,
                to: 199,
                handler: "yearn/3/vault".to_string(),
            }),
            Job::ExtractSnapshot(SnapshotTarget {
                chain_id: 1,
                address,
                abi_path: "yearn/3/vault".to_string(),
            }),
            Job::ExtractWebhook(WebhookTarget {
                abi_path: "yearn/3/vault".to_string(),
                chain_id: 1,
                block_number: 200,
                block_time: 1_700_000_000,
                subscription: Subscription::new(
                    "sub-1",
                    "https://hooks.example/kong".parse().unwrap(),
                    "yearn/3/vault",
                    "timeseries",
                    "apy",
                )
                .with_chain_ids(vec![1]),
                targets: vec![address],
            }),
            Job::ComputeTvl(compute.clone()),
            Job::ComputeApy(compute.clone()),
            Job::ComputeHarvestApr(compute),
            Job::LoadVault(thing.clone()),
            Job::LoadErc20(Thing::new(1, address, "erc20")),
            Job::LoadStrategy(Thing::new(1, address, "strategy")),
            Job::LoadThing(thing),
            Job::LoadWithdrawalQueue(WithdrawalQueue {
                chain_id: 1,
                vault: address,
                strategies: vec![Address::repeat_byte(0x11), Address::repeat_byte(0x12)],
                as_of_block: 200,
            }),
            Job::LoadSnapshot(Snapshot {
                chain_id: 1,
                address,
                block_number: 200,
                block_time: 1_700_000_000,
                snapshot: serde_json::Map::new(),
                hook: serde_json::Map::new(),
            }),
            Job::LoadEvmLog(Batch::new(vec![EvmLog {
                chain_id: 1,
                address,
                event_name: "Transfer".to_string(),
                signature: H256::repeat_byte(0x11),
                args: serde_json::Map::new(),
                block_number: 150,
                block_hash: H256::repeat_byte(0x22),
                block_time: 1_699_999_400,
                log_index: 3,
                transaction_hash: H256::repeat_byte(0x33),
                transaction_index: 7,
            }])),
            Job::LoadOutput(Batch::new(vec![Output {
                chain_id: 1,
                address,
                label: "tvl".to_string(),
                component: Some("totalAssets".to_string()),
                value: Some(125_000.0),
                block_number: 200,
                block_time: 1_700_000_000,
                series_time: 1_700_006_400,
            }])),
            Job::Probe {},
            Job::MonitorFailed {},
        ]
    }

    #[test]
    fn every_job_round_trips_through_its_parts() {
        let jobs = one_of_each();
        let names: HashSet<&str> = jobs.iter().map(Job::name).collect();
        assert_eq!(names.len(), jobs.len());

        for job in jobs {
            let (name, payload) = job.to_parts().unwrap();

            assert_eq!(Job::from_parts(name, payload).unwrap(), job);
        }
    }

    #[test]
    fn stores_payloads_without_the_tag() {
        let job = Job::ExtractVault(VaultTarget {
            chain_id: 1,
            address: Address::repeat_byte(0xab),
        });

        let (name, payload) = job.to_parts().unwrap();

        assert_eq!(name, "extract.vault");
        assert_eq!(
            payload,
            json!({"chainId": 1, "address": "0xabababababababababababababababababababab"})
        );
        assert_eq!(Job::from_parts(name, payload).unwrap(), job);
    }

    #[test]
    fn stores_empty_payloads_as_objects() {
        let (_, payload) = Job::Probe {}.to_parts().unwrap();

        assert_eq!(payload, json!({}));
    }

    #[test]
    fn rejects_unknown_names() {
        let error = Job::from_parts("extract.everything", json!({})).unwrap_err();

        assert!(error.contains("unknown variant"));
    }

    #[test]
    fn rejects_payloads_of_the_wrong_shape() {
        assert!(Job::from_parts("extract.vault", json!({"chainId": "mainnet"})).is_err());
    }

    #[test]
    fn routes_jobs_to_queues() {
        let target = ComputeTarget {
            chain_id: 1,
            address: Address::zero(),
            time: 0,
        };

        assert_eq!(Job::FanoutAbis {}.queue(), QueueName::Fanout);
        assert_eq!(Job::ComputeTvl(target).queue(), QueueName::Compute);
        assert_eq!(Job::MonitorFailed {}.queue(), QueueName::Probe);
        assert_eq!(
            Job::LoadOutput(Batch::new(vec![])).queue(),
            QueueName::Load
        );
    }

    #[test]
    fn parses_queue_names() {
        assert_eq!("extract".parse::<QueueName>().unwrap(), QueueName::Extract);
        assert!("everything".parse::<QueueName>().is_err());
    }
}
