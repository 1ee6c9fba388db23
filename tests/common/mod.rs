//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use std::time::Duration;
use vimc_rs::pipeline::{BufferState, EntityParams, QueueBuffer};
use vimc_rs::VideoNode;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_millis(500)
}

/// Entity parameters with manual pacing, so tests decide when frames flow
pub fn manual_params() -> EntityParams {
    EntityParams {
        frame_rate_hz: 0,
        ..EntityParams::default()
    }
}

/// Allocate and queue `count` buffers on `node`
pub fn queue_buffers(node: &VideoNode, count: usize) {
    for buffer in node.request_buffers(count) {
        node.queue(buffer).expect("buffer should be accepted");
    }
}

/// Dequeue `count` completed buffers, failing the test on timeout
pub fn dequeue_n(node: &VideoNode, count: usize) -> Vec<QueueBuffer> {
    (0..count)
        .map(|i| {
            node.dequeue(test_timeout())
                .expect("dequeue should not fail")
                .unwrap_or_else(|| panic!("buffer {} of {} never completed", i + 1, count))
        })
        .collect()
}

/// Assert every buffer completed in `state`
pub fn assert_all_in(buffers: &[QueueBuffer], state: BufferState) {
    for buffer in buffers {
        assert_eq!(
            buffer.state(),
            state,
            "buffer {} is {:?}, expected {:?}",
            buffer.index(),
            buffer.state(),
            state
        );
    }
}
