// Draft domain: roles, champion pools, the session state machine and
// locked-team records.

pub mod pool;
pub mod role;
pub mod session;
pub mod team;
