mod batch;
mod tester;

pub use batch::{run_task_sweeper, BatchCoordinator};
pub use tester::AccountTester;
