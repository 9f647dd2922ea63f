pub mod emitter;
pub mod pacer;
pub mod resolver;
pub mod scheduler;

pub use emitter::{format_post, ConsoleEmitter, FeedEmitter};
pub use pacer::{ManualSleeper, Pacer, Sleeper, TokioSleeper};
pub use resolver::{read_accounts_file, validate_selector, FileEntry, TargetResolver};
pub use scheduler::{PollScheduler, PollStats, SchedulerState};
