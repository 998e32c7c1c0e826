//! Field schema shared by the accumulator, the writer and the loader.
//!
//! Every per-star label is described once here; buffers, output columns and
//! the target list are all derived from [`LABELS`] instead of being spelled
//! out field by field.

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogRecord;

/// Placeholder for "value not available" in the catalog and in every label
/// column of a compiled dataset.
pub const SENTINEL: f32 = -9999.0;

/// Number of entries in the catalog `PARAM` vector.
pub const N_PARAMS: usize = 7;

/// Number of entries in the catalog `X_H` vector.
pub const N_ABUNDANCES: usize = 26;

/// Index of [Fe/H] inside `X_H`.
pub const FE_INDEX: usize = 17;

/// Keyword that expands to [`TRAINING_TARGETS`].
pub const ALL_KEYWORD: &str = "all";

/// Where a label is read from in a catalog row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelSource {
    /// `PARAM[i]`, uncertainty from the diagonal `PARAM_COV[i, i]`.
    Param(usize),
    /// `X_H[i]`, uncertainty from `X_H_ERR[i]`.
    Abundance(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelField {
    pub name: &'static str,
    pub source: LabelSource,
}

const fn param(name: &'static str, i: usize) -> LabelField {
    LabelField {
        name,
        source: LabelSource::Param(i),
    }
}

const fn abundance(name: &'static str, i: usize) -> LabelField {
    LabelField {
        name,
        source: LabelSource::Abundance(i),
    }
}

/// Catalog labels copied into every compiled row, in output order.
pub const LABELS: [LabelField; 30] = [
    param("teff", 0),
    param("logg", 1),
    param("M", 3),
    param("alpha", 6),
    abundance("C", 0),
    abundance("C1", 1),
    abundance("N", 2),
    abundance("O", 3),
    abundance("Na", 4),
    abundance("Mg", 5),
    abundance("Al", 6),
    abundance("Si", 7),
    abundance("P", 8),
    abundance("S", 9),
    abundance("K", 10),
    abundance("Ca", 11),
    abundance("Ti", 12),
    abundance("Ti2", 13),
    abundance("V", 14),
    abundance("Cr", 15),
    abundance("Mn", 16),
    abundance("Fe", FE_INDEX),
    abundance("Co", 18),
    abundance("Ni", 19),
    abundance("Cu", 20),
    abundance("Ge", 21),
    abundance("Ce", 22),
    abundance("Rb", 23),
    abundance("Y", 24),
    abundance("Nd", 25),
];

/// Labels filled in by the cross-matcher rather than the catalog.
pub const DERIVED: [&str; 2] = ["parallax", "fakemag"];

/// Per-row metadata columns.
pub const SNR: &str = "SNR";
pub const RA: &str = "RA";
pub const DEC: &str = "DEC";
pub const KMAG: &str = "Kmag";

pub const SPECTRA: &str = "spectra";
pub const SPECTRA_ERR: &str = "spectra_err";
pub const IN_FLAG: &str = "in_flag";
pub const INDEX: &str = "index";

/// The fixed label set a network is trained on when the caller asks for `all`.
pub const TRAINING_TARGETS: [&str; 19] = [
    "teff", "logg", "M", "alpha", "C", "C1", "N", "O", "Na", "Mg", "Al", "Si", "P", "Ca", "Ti",
    "Ti2", "Mn", "Fe", "Ni",
];

/// Column name holding the uncertainty of `name`.
pub fn err_name(name: &str) -> String {
    format!("{name}_err")
}

impl LabelField {
    pub fn value(&self, record: &CatalogRecord) -> f32 {
        let v = match self.source {
            LabelSource::Param(i) => record.param.get(i),
            LabelSource::Abundance(i) => record.x_h.get(i),
        };
        v.copied().unwrap_or(SENTINEL)
    }

    pub fn uncertainty(&self, record: &CatalogRecord) -> f32 {
        let v = match self.source {
            LabelSource::Param(i) => record.param_cov.get(i * N_PARAMS + i),
            LabelSource::Abundance(i) => record.x_h_err.get(i),
        };
        v.copied().unwrap_or(SENTINEL)
    }
}

/// Which label columns the loader stacks into the label matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    Keyword(String),
    Fields(Vec<String>),
}

impl Default for Target {
    fn default() -> Self {
        Target::Keyword(ALL_KEYWORD.to_string())
    }
}

impl Target {
    /// Expand `all` to the training label list; any other single name is a
    /// one-column target.
    pub fn resolve(&self) -> Vec<String> {
        match self {
            Target::Keyword(k) if k == ALL_KEYWORD => {
                TRAINING_TARGETS.iter().map(|s| s.to_string()).collect()
            }
            Target::Keyword(k) => vec![k.clone()],
            Target::Fields(fields) => {
                if fields.len() == 1 && fields[0] == ALL_KEYWORD {
                    return Target::Keyword(ALL_KEYWORD.to_string()).resolve();
                }
                fields.clone()
            }
        }
    }
}

impl From<&str> for Target {
    fn from(s: &str) -> Self {
        Target::Keyword(s.to_string())
    }
}

impl From<Vec<&str>> for Target {
    fn from(v: Vec<&str>) -> Self {
        Target::Fields(v.into_iter().map(str::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_names_are_unique() {
        let mut names: Vec<&str> = LABELS.iter().map(|l| l.name).collect();
        names.extend(DERIVED);
        let before = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), before);
    }

    #[test]
    fn training_targets_are_catalog_labels() {
        for t in TRAINING_TARGETS {
            assert!(LABELS.iter().any(|l| l.name == t), "{t} is not a label");
        }
    }

    #[test]
    fn all_keyword_expands() {
        assert_eq!(Target::default().resolve().len(), 19);
        assert_eq!(Target::from(vec!["all"]).resolve().len(), 19);
        assert_eq!(Target::from("teff").resolve(), vec!["teff".to_string()]);
        assert_eq!(
            Target::from(vec!["Fe", "parallax"]).resolve(),
            vec!["Fe".to_string(), "parallax".to_string()]
        );
    }

    #[test]
    fn short_catalog_vectors_read_as_sentinel() {
        let record = CatalogRecord {
            param: vec![4800.0, 2.5],
            param_cov: vec![],
            x_h: vec![0.1; 3],
            ..CatalogRecord::default()
        };
        assert_eq!(LABELS[0].value(&record), 4800.0);
        assert_eq!(LABELS[0].uncertainty(&record), SENTINEL);
        assert_eq!(LABELS[2].value(&record), SENTINEL);
        let fe = LABELS.iter().find(|l| l.name == "Fe").unwrap();
        assert_eq!(fe.value(&record), SENTINEL);
    }
}
