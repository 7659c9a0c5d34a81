pub mod batch_contract;
pub mod batch_purchase;
pub mod dock;
pub mod navigate;
pub mod scout_markets;
pub mod scout_tour;

pub use batch_contract::*;
pub use batch_purchase::*;
pub use dock::*;
pub use navigate::*;
pub use scout_markets::*;
pub use scout_tour::*;
