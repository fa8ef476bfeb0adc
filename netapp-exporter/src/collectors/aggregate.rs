use netapp_common::config::Filer;
use netapp_common::types::{Aggregate, ResourceKind};
use tracing::debug;

use super::{flag, RecordCollector, RecordMetric, ResourceReader};

pub const LABELS: &[&str] = &["node", "aggregate"];

pub fn metrics() -> Vec<RecordMetric<Aggregate>> {
    vec![
        RecordMetric {
            name: "netapp_aggregate_total_bytes",
            help: "Netapp Aggregate Metrics: total size",
            value: |a: &Aggregate| a.size_total,
        },
        RecordMetric {
            name: "netapp_aggregate_available_bytes",
            help: "Netapp Aggregate Metrics: available size",
            value: |a: &Aggregate| a.size_available,
        },
        RecordMetric {
            name: "netapp_aggregate_used_bytes",
            help: "Netapp Aggregate Metrics: used size",
            value: |a: &Aggregate| a.size_used,
        },
        RecordMetric {
            name: "netapp_aggregate_used_percentage",
            help: "Netapp Aggregate Metrics: used percentage",
            value: |a: &Aggregate| a.percent_used_capacity,
        },
        RecordMetric {
            name: "netapp_aggregate_physical_used_bytes",
            help: "Netapp Aggregate Metrics: physical used size",
            value: |a: &Aggregate| a.physical_used,
        },
        RecordMetric {
            name: "netapp_aggregate_physical_used_percentage",
            help: "Netapp Aggregate Metrics: physical used percentage",
            value: |a: &Aggregate| a.physical_used_percent,
        },
        RecordMetric {
            name: "netapp_aggregate_is_encrypted",
            help: "Netapp Aggregate Metrics: software encryption enabled",
            value: |a: &Aggregate| flag(a.is_encrypted),
        },
    ]
}

fn label_values(a: &Aggregate) -> Vec<String> {
    vec![a.owner_name.clone(), a.name.clone()]
}

/// Aggregate collector; names not matching the filer's pattern are skipped
pub fn collector(filer: &Filer, reader: ResourceReader<Aggregate>) -> RecordCollector<Aggregate> {
    let collector = RecordCollector::new(
        filer,
        ResourceKind::Aggregate,
        reader,
        metrics(),
        LABELS,
        label_values,
    );
    if filer.aggregate_pattern.is_none() {
        return collector;
    }
    let filer = filer.clone();
    collector.with_filter(Box::new(move |a: &Aggregate| {
        let keep = filer.aggregate_matches(&a.name);
        if !keep {
            debug!("{}: aggregate {} filtered out", filer.name, a.name);
        }
        keep
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::ResourceFetcher;
    use crate::scrape::SyncFetcher;
    use async_trait::async_trait;
    use netapp_client::ClientError;
    use regex::Regex;
    use std::sync::Arc;

    struct Fixed;

    #[async_trait]
    impl ResourceFetcher<Aggregate> for Fixed {
        async fn fetch(&self) -> Result<Vec<Aggregate>, ClientError> {
            Ok(vec![
                Aggregate {
                    name: "aggr_ssd_01".to_string(),
                    owner_name: "node-01".to_string(),
                    size_total: 1000.0,
                    ..Default::default()
                },
                Aggregate {
                    name: "aggr0_root".to_string(),
                    owner_name: "node-01".to_string(),
                    size_total: 10.0,
                    ..Default::default()
                },
            ])
        }
    }

    fn filer(pattern: Option<&str>) -> Filer {
        Filer {
            name: "filer-a".to_string(),
            host: "filer-a.example.com".to_string(),
            availability_zone: "az-a".to_string(),
            username: String::new(),
            password: String::new(),
            api_version: "1.7".to_string(),
            aggregate_pattern: pattern.map(|p| Regex::new(p).unwrap()),
        }
    }

    #[tokio::test]
    async fn test_pattern_filters_aggregates() {
        let filer = filer(Some("^aggr_ssd"));
        let reader = ResourceReader::Synchronous(SyncFetcher::new(Arc::new(Fixed)));
        let families = netapp_common::ScrapeCollector::collect(&collector(&filer, reader)).await;

        let total = families
            .iter()
            .find(|f| f.get_name() == "netapp_aggregate_total_bytes")
            .unwrap();
        assert_eq!(total.get_metric().len(), 1);
        assert_eq!(total.get_metric()[0].get_gauge().get_value(), 1000.0);
        assert_eq!(families.len(), metrics().len());
    }

    #[tokio::test]
    async fn test_no_pattern_keeps_all() {
        let filer = filer(None);
        let reader = ResourceReader::Synchronous(SyncFetcher::new(Arc::new(Fixed)));
        let families = netapp_common::ScrapeCollector::collect(&collector(&filer, reader)).await;
        assert!(families.iter().all(|f| f.get_metric().len() == 2));

        let labels = families[0].get_metric()[0].get_label();
        let names: Vec<_> = labels.iter().map(|l| l.get_name()).collect();
        assert!(names.contains(&"filer"));
        assert!(names.contains(&"availability_zone"));
        assert!(names.contains(&"aggregate"));
    }
}
