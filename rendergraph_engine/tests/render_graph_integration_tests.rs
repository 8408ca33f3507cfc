//! Integration tests for graph materialization and frame replay on Vulkan
//!
//! All tests require a GPU and are marked with #[ignore].
//!
//! Run with: cargo test --test render_graph_integration_tests -- --ignored


use std::sync::Arc;
use rendergraph_engine::rendergraph::{Error, Renderer, Result};
use rendergraph_engine::rendergraph::frame::{
    command_queue, FrameCollaborator, FrameContext, FrameLoop, FrameOutcome, RenderCommand,
};
use rendergraph_engine::rendergraph::graph::{CategoryFlags, RenderGraph, RenderGraphHandler, RenderModel};
use rendergraph_engine::rendergraph::render::{
    Config, DescriptorAllocator, DescriptorSetHolder, DescriptorSetType, ExtentClass, Extents,
    TextureFormat, TextureUsage,
};
use gpu_test_utils::{create_test_renderer, create_test_window, register_color_input_layout};
use serial_test::serial;

// ============================================================================
// HELPERS
// ============================================================================

/// Collaborator without models: every node still clears and stores its attachments
#[derive(Default)]
struct EmptyScene {
    sets: DescriptorSetHolder,
    frames: u32,
    rebuilds: u32,
}

impl FrameCollaborator for EmptyScene {
    fn render_models(&mut self, _frame: &mut FrameContext) -> Result<Vec<RenderModel>> {
        self.frames += 1;
        Ok(Vec::new())
    }

    fn scene_descriptor_sets(&self) -> &DescriptorSetHolder {
        &self.sets
    }

    fn apply_command(&mut self, _command: RenderCommand, _frame: &mut FrameContext) -> Result<()> {
        Ok(())
    }

    fn on_swapchain_rebuilt(&mut self, _renderer: &dyn Renderer, _graph: &RenderGraph, _extents: &Extents) -> Result<()> {
        self.rebuilds += 1;
        Ok(())
    }
}

/// gbuffer (albedo + depth) sampled by a resolve node drawing into the swapchain
fn deferred_graph(renderer: &dyn Renderer) -> RenderGraph {
    let depth_format = renderer.device_info().depth_format;
    let mut graph = RenderGraph::new(renderer.device_info());

    let gbuffer = graph.add_node("gbuffer", ExtentClass::Presentation, CategoryFlags::RENDER_MODEL).unwrap();
    let albedo = graph.attach(gbuffer, "albedo", TextureFormat::R8G8B8A8_UNORM).unwrap();
    graph.attach(gbuffer, "depth", depth_format).unwrap();

    let resolve = graph.add_node("resolve", ExtentClass::Presentation, CategoryFlags::VIEWPORT).unwrap();
    graph.attach_swapchain(resolve).unwrap();
    graph.forward_as_sampled(albedo, resolve, DescriptorSetType::COLOR_INPUT, 0).unwrap();

    graph.build(renderer).unwrap();
    graph
}

// ============================================================================
// MATERIALIZATION TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_integration_handler_materializes_attachments() {
    let (window, _event_loop) = create_test_window();
    let renderer = Arc::new(create_test_renderer(&window));
    register_color_input_layout(renderer.as_ref(), 1);

    let graph = deferred_graph(renderer.as_ref());
    let swapchain = renderer.create_swapchain(&window).unwrap();
    let extents = Extents::new(swapchain.extent(), &Config::default());

    let handler = RenderGraphHandler::new(renderer.as_ref(), &graph, &extents, renderer.as_ref()).unwrap();

    assert_eq!(handler.attachment_image_count(), 2);
    let albedo = handler.attachment_image("albedo").unwrap();
    assert!(albedo.texture.info().usage.contains(TextureUsage::SAMPLED | TextureUsage::COLOR_ATTACHMENT));
    assert_eq!(albedo.texture.info().width, swapchain.extent().width);

    let depth = handler.attachment_image("depth").unwrap();
    assert!(depth.texture.info().usage.contains(TextureUsage::DEPTH_STENCIL_ATTACHMENT));

    let resolve = graph.node_id("resolve").unwrap();
    assert!(handler.node_descriptor_sets(resolve).unwrap().contains_key(&DescriptorSetType::COLOR_INPUT));

    let framebuffers = handler.create_swapchain_framebuffers(renderer.as_ref(), &graph, swapchain.images()).unwrap();
    assert_eq!(framebuffers.len(), swapchain.images().len());
    assert!(framebuffers[0].for_node(resolve).is_some());

    drop(framebuffers);
    drop(handler);
    drop(swapchain);
    renderer.wait_idle().unwrap();
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_integration_unregistered_set_type_rejected() {
    let (window, _event_loop) = create_test_window();
    let renderer = Arc::new(create_test_renderer(&window));

    let result = renderer.free_descriptor_set(DescriptorSetType(42));
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

// ============================================================================
// FRAME LOOP TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_integration_frame_loop_presents_frames() {
    let (window, _event_loop) = create_test_window();
    let renderer = Arc::new(create_test_renderer(&window));
    register_color_input_layout(renderer.as_ref(), 1);

    let graph = deferred_graph(renderer.as_ref());
    let swapchain = renderer.create_swapchain(&window).unwrap();
    let (sender, receiver) = command_queue();
    let mut frame_loop = FrameLoop::new(
        renderer.clone(),
        renderer.clone() as Arc<dyn DescriptorAllocator>,
        graph,
        swapchain,
        &Config::default(),
    )
    .unwrap()
    .with_command_queue(receiver);

    let mut scene = EmptyScene::default();
    let mut presented = 0;
    for _ in 0..6 {
        match frame_loop.draw_frame(&mut scene).unwrap() {
            FrameOutcome::Presented(stats) => {
                presented += 1;
                assert_eq!(stats.passes, 2);
                assert_eq!(stats.draw_calls, 0);
                assert_eq!(stats.barriers, 1);
            }
            FrameOutcome::SwapchainRebuilt => {}
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert!(presented > 0);
    assert!(frame_loop.frame_number() >= presented);
    assert!(!sender.is_disconnected());

    frame_loop.request_close();
    assert_eq!(frame_loop.draw_frame(&mut scene).unwrap(), FrameOutcome::Closed);
    frame_loop.shutdown().unwrap();
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_integration_frame_loop_resize_rebuilds_attachments() {
    let (window, _event_loop) = create_test_window();
    let renderer = Arc::new(create_test_renderer(&window));
    register_color_input_layout(renderer.as_ref(), 1);

    let graph = deferred_graph(renderer.as_ref());
    let swapchain = renderer.create_swapchain(&window).unwrap();
    let mut frame_loop = FrameLoop::new(
        renderer.clone(),
        renderer.clone() as Arc<dyn DescriptorAllocator>,
        graph,
        swapchain,
        &Config::default(),
    )
    .unwrap();

    let mut scene = EmptyScene::default();
    frame_loop.draw_frame(&mut scene).unwrap();

    frame_loop.resize(640, 480);
    assert_eq!(frame_loop.draw_frame(&mut scene).unwrap(), FrameOutcome::SwapchainRebuilt);
    assert_eq!(scene.rebuilds, 1);
    assert_eq!(frame_loop.handler().attachment_image_count(), 2);
    assert!(frame_loop.handler().attachment_image("albedo").is_some());

    frame_loop.resize(0, 0);
    assert_eq!(frame_loop.draw_frame(&mut scene).unwrap(), FrameOutcome::Skipped);

    frame_loop.shutdown().unwrap();
}
