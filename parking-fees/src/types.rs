/// Module for monetary amounts and fee outcomes.
pub mod money;

/// Module for clock times, time ranges and day types.
pub mod time;
