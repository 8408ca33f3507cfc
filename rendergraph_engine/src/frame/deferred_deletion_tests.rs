//! Unit tests for deferred_deletion.rs

use super::*;
use std::sync::Arc;

#[test]
fn test_release_frame_only_drops_that_slot() {
    let mut queue = DeferredDeletionQueue::new(4);
    let first = Arc::new("vertex buffer");
    let second = Arc::new("index buffer");
    queue.push(0, Arc::clone(&first)).unwrap();
    queue.push(1, Arc::clone(&second)).unwrap();

    assert_eq!(queue.release_frame(1), 1);
    assert_eq!(Arc::strong_count(&second), 1);
    assert_eq!(Arc::strong_count(&first), 2);
    assert_eq!(queue.pending_for(0), 1);
    assert_eq!(queue.len(), 1);

    assert_eq!(queue.release_frame(0), 1);
    assert_eq!(Arc::strong_count(&first), 1);
    assert!(queue.is_empty());
}

#[test]
fn test_release_frame_on_empty_slot() {
    let mut queue: DeferredDeletionQueue<u32> = DeferredDeletionQueue::new(2);
    assert_eq!(queue.release_frame(1), 0);
    assert_eq!(queue.release_frame(7), 0);
}

#[test]
fn test_release_all() {
    let mut queue = DeferredDeletionQueue::new(3);
    for frame in 0..3 {
        queue.push(frame, frame as u32).unwrap();
        queue.push(frame, 10 + frame as u32).unwrap();
    }

    assert_eq!(queue.len(), 6);
    assert_eq!(queue.release_all(), 6);
    assert!(queue.is_empty());
}

#[test]
fn test_push_out_of_range_fails() {
    let mut queue = DeferredDeletionQueue::new(2);
    assert!(matches!(queue.push(2, 0u8), Err(Error::InvalidResource(_))));
}
