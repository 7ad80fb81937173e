//! Pipeline module - coarsening, matching and imbalance scoring

pub mod coarsen;
pub mod error;
pub mod imbalance;
pub mod levels;
pub mod loader;
pub mod schema;
pub mod selector;
pub mod session;
pub mod strata;
pub mod weights;

pub use coarsen::{coarsen, missing_continuous};
pub use error::{CemError, Result};
pub use imbalance::{
    imbalance, imbalance_with_order, marginal_to_dataframe, univariate_imbalance, BalanceStatistic,
    Imbalance, MarginalImbalance, Measure, PairImbalance, QUANTILES,
};
pub use levels::{Level, TreatmentColumn};
pub use loader::{dataset_stats, load_dataset, save_dataset};
pub use schema::{BinMethod, BinSpec, Bins, CoarseningSchema};
pub use selector::{
    auto_coarsen, equal_width_schema, select_h, select_schema, select_schema_with_observer,
    SchemaSelection, SweepObserver, SweepOptions, SweepStep,
};
pub use session::{Cem, CemConfig};
pub use strata::Strata;
pub use weights::{
    match_weights, match_weights_with_order, total_weight, validate_weights, MatchResult,
    MatchStatus,
};
