//! Scenario tests spanning the faderlink crates

#[cfg(test)]
mod support;

#[cfg(test)]
mod control_scenarios;

#[cfg(test)]
mod persistence;

#[cfg(test)]
mod ui_flow;
