use super::test_helpers::*;
use super::*;
use crate::error::Error;
use crate::types::{Event, RecordId, Status};
use std::time::Duration;

mod lifecycle;

/// Worker id used when tests drive jobs by hand
const TEST_WORKER: &str = "test-worker";
