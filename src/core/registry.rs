use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;

use super::ModelSummary;

/// Bytes to decimal gigabytes, as shown next to each model.
pub fn gigabytes(bytes: u64) -> f64 {
    bytes as f64 / 1e9
}

/// Parse a parameter-size label ("7B", "1.5b", "500M") into a parameter
/// count. Labels without a recognizable number give `None`.
pub fn parse_parameter_size(label: &str) -> Option<f64> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*(\d+(?:\.\d+)?)\s*([kmbt]?)\s*$").expect("static pattern")
    });

    let caps = pattern.captures(label)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    let scale = match caps.get(2).map(|m| m.as_str().to_ascii_uppercase()) {
        Some(unit) if unit == "K" => 1e3,
        Some(unit) if unit == "M" => 1e6,
        Some(unit) if unit == "B" => 1e9,
        Some(unit) if unit == "T" => 1e12,
        _ => 1.0,
    };
    Some(value * scale)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Name,
    Size,
    Parameters,
    Family,
    Modified,
}

/// Installed models at the time of the last list call. Replaced wholesale
/// on refresh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrySnapshot {
    models: Vec<ModelSummary>,
}

impl RegistrySnapshot {
    pub fn new(models: Vec<ModelSummary>) -> Self {
        Self { models }
    }

    pub fn models(&self) -> &[ModelSummary] {
        &self.models
    }

    pub fn into_models(self) -> Vec<ModelSummary> {
        self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ModelSummary> {
        self.models.iter().find(|m| m.id == id)
    }

    pub fn total_size(&self) -> u64 {
        self.models.iter().map(|m| m.size).sum()
    }

    pub fn largest(&self) -> Option<&ModelSummary> {
        self.models.iter().max_by_key(|m| m.size)
    }

    /// Case-insensitive match on id, family or parameter label.
    pub fn filter(&self, term: &str) -> Vec<&ModelSummary> {
        let term = term.trim().to_lowercase();
        self.models
            .iter()
            .filter(|m| {
                term.is_empty()
                    || m.id.to_lowercase().contains(&term)
                    || m.family.to_lowercase().contains(&term)
                    || m.parameter_size.trim().to_lowercase().contains(&term)
            })
            .collect()
    }

    pub fn sorted(&self, key: SortKey, ascending: bool) -> Vec<&ModelSummary> {
        let mut models: Vec<&ModelSummary> = self.models.iter().collect();
        sort_models(&mut models, key, ascending);
        models
    }
}

/// Unparseable parameter labels and timestamps always land after parsed ones.
pub fn sort_models(models: &mut [&ModelSummary], key: SortKey, ascending: bool) {
    let directed = |ord: Ordering| if ascending { ord } else { ord.reverse() };

    models.sort_by(|a, b| match key {
        SortKey::Name => directed(a.id.to_lowercase().cmp(&b.id.to_lowercase())),
        SortKey::Size => directed(a.size.cmp(&b.size)),
        SortKey::Family => directed(a.family.to_lowercase().cmp(&b.family.to_lowercase())),
        SortKey::Modified => match (a.modified(), b.modified()) {
            (Some(x), Some(y)) => directed(x.cmp(&y)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => directed(a.modified_at.cmp(&b.modified_at)),
        },
        SortKey::Parameters => {
            match (
                parse_parameter_size(&a.parameter_size),
                parse_parameter_size(&b.parameter_size),
            ) {
                (Some(x), Some(y)) => directed(x.total_cmp(&y)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(id: &str, size: u64, family: &str, params: &str, modified: &str) -> ModelSummary {
        ModelSummary {
            id: id.to_string(),
            size,
            modified_at: modified.to_string(),
            family: family.to_string(),
            parameter_size: params.to_string(),
        }
    }

    fn snapshot() -> RegistrySnapshot {
        RegistrySnapshot::new(vec![
            model("llama3:8b", 4_200_000_000, "llama", "8B", "2024-05-01T10:00:00Z"),
            model("qwen2:0.5b", 1_100_000_000, "qwen2", "500M", "2024-06-01T10:00:00Z"),
        ])
    }

    #[test]
    fn test_total_and_largest() {
        let registry = snapshot();
        assert_eq!(registry.total_size(), 5_300_000_000);
        assert!((gigabytes(registry.total_size()) - 5.3).abs() < 1e-9);
        assert_eq!(registry.largest().map(|m| m.id.as_str()), Some("llama3:8b"));
    }

    #[test]
    fn test_empty_registry() {
        let registry = RegistrySnapshot::default();
        assert_eq!(registry.total_size(), 0);
        assert!(registry.largest().is_none());
    }

    #[test]
    fn test_parse_parameter_size() {
        assert_eq!(parse_parameter_size("7B"), Some(7e9));
        assert_eq!(parse_parameter_size("1.5b"), Some(1.5e9));
        assert_eq!(parse_parameter_size("500M"), Some(5e8));
        assert_eq!(parse_parameter_size(" 13 B "), Some(13e9));
        assert_eq!(parse_parameter_size("42"), Some(42.0));
        assert_eq!(parse_parameter_size(""), None);
        assert_eq!(parse_parameter_size("unknown"), None);
        assert_eq!(parse_parameter_size("8x7B"), None);
    }

    #[test]
    fn test_sort_by_parameters_scales_units() {
        let registry = snapshot();
        let ids: Vec<&str> = registry
            .sorted(SortKey::Parameters, true)
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(ids, vec!["qwen2:0.5b", "llama3:8b"]);
    }

    #[test]
    fn test_unparsed_parameters_sort_last_both_directions() {
        let registry = RegistrySnapshot::new(vec![
            model("mystery:latest", 1, "", "", ""),
            model("small:1b", 1, "", "1B", ""),
            model("big:70b", 1, "", "70B", ""),
            model("odd:latest", 1, "", "n/a", ""),
        ]);

        let ascending: Vec<&str> = registry
            .sorted(SortKey::Parameters, true)
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(&ascending[..2], &["small:1b", "big:70b"]);

        let descending: Vec<&str> = registry
            .sorted(SortKey::Parameters, false)
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(&descending[..2], &["big:70b", "small:1b"]);
        assert!(descending[2..].contains(&"mystery:latest"));
        assert!(descending[2..].contains(&"odd:latest"));
    }

    #[test]
    fn test_sort_by_size_and_modified() {
        let registry = snapshot();
        let by_size = registry.sorted(SortKey::Size, false);
        assert_eq!(by_size[0].id, "llama3:8b");

        let by_modified = registry.sorted(SortKey::Modified, false);
        assert_eq!(by_modified[0].id, "qwen2:0.5b");
    }

    #[test]
    fn test_modified_sort_with_mixed_offsets_and_bad_timestamps() {
        let stamps = ["2024-05-01T10:00:00+05:00", "2024-05-01T06:00:00Z", "2024-05-01T09-bad"];
        let models: Vec<ModelSummary> = (0..40)
            .map(|i| {
                let stamp = stamps[i % stamps.len()];
                model(&format!("m{i:02}"), 1, "", "", stamp)
            })
            .collect();
        let registry = RegistrySnapshot::new(models);

        for ascending in [true, false] {
            let sorted = registry.sorted(SortKey::Modified, ascending);
            assert_eq!(sorted.len(), 40);
            let parsed = sorted.iter().take_while(|m| m.modified().is_some()).count();
            assert_eq!(parsed, 27);
            assert!(sorted[parsed..].iter().all(|m| m.modified_at == stamps[2]));

            let instants: Vec<_> = sorted[..parsed].iter().filter_map(|m| m.modified()).collect();
            let in_order = instants.windows(2).all(|w| {
                if ascending { w[0] <= w[1] } else { w[0] >= w[1] }
            });
            assert!(in_order);
        }
    }

    #[test]
    fn test_filter_matches_id_family_and_params() {
        let registry = snapshot();
        assert_eq!(registry.filter("").len(), 2);
        assert_eq!(registry.filter("LLAMA")[0].id, "llama3:8b");
        assert_eq!(registry.filter("500m")[0].id, "qwen2:0.5b");
        assert!(registry.filter("mistral").is_empty());
    }
}
