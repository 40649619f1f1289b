pub mod crew;
pub mod executor;

pub use crew::{Crew, CrewOutput};
pub use executor::{AgentExecutor, ExecutorConfig};
