//! Unit tests for command_queue.rs

use super::*;

#[test]
fn test_drain_keeps_send_order() {
    let (sender, receiver) = command_queue();
    sender.send(RenderCommand::AddObject { kind: ObjectKind::Camera, name: "main".to_string() }).unwrap();
    sender.send(RenderCommand::SetActiveCamera(ObjectId(0))).unwrap();
    sender.send(RenderCommand::UpdateObjectTransforms(vec![(0, Mat4::IDENTITY)])).unwrap();

    assert_eq!(receiver.len(), 3);
    let drained = receiver.drain();
    assert_eq!(drained.len(), 3);
    assert_eq!(drained[1], RenderCommand::SetActiveCamera(ObjectId(0)));
    assert!(receiver.is_empty());
    assert!(receiver.try_recv().is_none());
}

#[test]
fn test_send_from_another_thread() {
    let (sender, receiver) = command_queue();
    let producer = std::thread::spawn(move || {
        sender
            .send(RenderCommand::LoadModel { name: "crate".to_string(), source: PathBuf::from("models/crate.obj") })
            .unwrap();
        sender
            .send(RenderCommand::AddGeometry { faces: vec![[Vec3::ZERO, Vec3::X, Vec3::Y]] })
            .unwrap();
    });
    producer.join().unwrap();

    let drained = receiver.drain();
    assert!(matches!(&drained[0], RenderCommand::LoadModel { name, .. } if name == "crate"));
    assert!(matches!(&drained[1], RenderCommand::AddGeometry { faces } if faces.len() == 1));
}

#[test]
fn test_send_after_receiver_dropped_fails() {
    let (sender, receiver) = command_queue();
    drop(receiver);

    assert!(sender.is_disconnected());
    let result = sender.send(RenderCommand::SetActiveCamera(ObjectId(1)));
    assert!(matches!(result, Err(Error::BackendError(_))));
}
