//! Unit tests for render_graph_handler.rs

use super::*;
use crate::renderer::mock_renderer::{
    mock_device_info, mock_set, MockBuffer, MockCommandList, MockDescriptorAllocator, MockPipeline,
    MockRenderer, MockSwapchain, MOCK_DEPTH_FORMAT,
};
use crate::renderer::{Buffer, Config, Extent2D, PipelineLayoutInfo, ShaderStage, ShaderStageLayout};
use super::super::render_model::CategoryFlags;

// ============================================================================
// HELPERS
// ============================================================================

fn extents() -> Extents {
    Extents::new(Extent2D { width: 800, height: 600 }, &Config::default())
}

fn pipeline(sets: &[(u32, DescriptorSetType)]) -> Arc<dyn Pipeline> {
    let mut vertex = ShaderStageLayout::new(ShaderStage::Vertex);
    vertex.set_types = sets.iter().copied().collect();
    Arc::new(MockPipeline::new(PipelineLayoutInfo::merge(&vertex, None, None).unwrap()))
}

/// "geometry" renders `color`; "present" samples it into the swapchain
fn color_to_sampled_graph(renderer: &MockRenderer) -> (RenderGraph, NodeId, NodeId) {
    let mut graph = RenderGraph::new(&mock_device_info());
    let geometry = graph.add_node("geometry", ExtentClass::Presentation, CategoryFlags::RENDER_MODEL).unwrap();
    let present = graph.add_node("present", ExtentClass::Presentation, CategoryFlags::VIEWPORT).unwrap();
    let color = graph.attach(geometry, "color", TextureFormat::R8G8B8A8_UNORM).unwrap();
    graph.attach_swapchain(present).unwrap();
    graph.forward_as_sampled(color, present, DescriptorSetType::COLOR_INPUT, 0).unwrap();
    graph.build(renderer).unwrap();
    (graph, geometry, present)
}

struct Fixture {
    renderer: MockRenderer,
    graph: RenderGraph,
    handler: RenderGraphHandler,
    swapchain: Vec<SwapchainFramebuffer>,
}

fn fixture(build: impl FnOnce(&MockRenderer) -> RenderGraph) -> Fixture {
    let renderer = MockRenderer::new();
    let graph = build(&renderer);
    let handler = RenderGraphHandler::new(&renderer, &graph, &extents(), &MockDescriptorAllocator::new()).unwrap();
    let images = MockSwapchain::new(800, 600, 2).images;
    let swapchain = handler.create_swapchain_framebuffers(&renderer, &graph, &images).unwrap();
    Fixture { renderer, graph, handler, swapchain }
}

fn record(f: &Fixture, models: &[RenderModel]) -> (MockCommandList, FrameStats) {
    let mut cmd = MockCommandList::new();
    let stats = f.handler
        .fill_command_buffer(&mut cmd, &f.graph, &f.swapchain[0], &DescriptorSetHolder::new(), models)
        .unwrap();
    (cmd, stats)
}

// ============================================================================
// MATERIALIZATION
// ============================================================================

#[test]
fn test_unbuilt_graph_rejected() {
    let renderer = MockRenderer::new();
    let mut graph = RenderGraph::new(&mock_device_info());
    graph.add_node("a", ExtentClass::Presentation, CategoryFlags::RENDER_MODEL).unwrap();

    let result = RenderGraphHandler::new(&renderer, &graph, &extents(), &MockDescriptorAllocator::new());
    assert!(matches!(result, Err(Error::InvalidGraph(_))));
}

#[test]
fn test_same_name_attachments_share_one_image() {
    let f = fixture(|renderer| {
        let mut graph = RenderGraph::new(&mock_device_info());
        let a = graph.add_node("a", ExtentClass::Presentation, CategoryFlags::RENDER_MODEL).unwrap();
        let b = graph.add_node("b", ExtentClass::Presentation, CategoryFlags::UI_SHAPE).unwrap();
        graph.attach(a, "albedo", TextureFormat::R8G8B8A8_UNORM).unwrap();
        graph.attach(a, "depth", MOCK_DEPTH_FORMAT).unwrap();
        graph.attach(b, "overlay", TextureFormat::R8G8B8A8_UNORM).unwrap();
        graph.attach(b, "depth", MOCK_DEPTH_FORMAT).unwrap();
        graph.build(renderer).unwrap();
        graph
    });

    assert_eq!(f.handler.attachment_image_count(), 3);
    assert_eq!(f.renderer.get_created_textures().iter().filter(|t| t.contains("D32_FLOAT")).count(), 1);
    let depth = f.handler.attachment_image("depth").unwrap();
    assert_eq!(depth.texture.info().usage, TextureUsage::DEPTH_STENCIL_ATTACHMENT);
}

#[test]
fn test_sampled_usage_follows_any_same_name_edge() {
    let f = fixture(|renderer| {
        let mut graph = RenderGraph::new(&mock_device_info());
        let a = graph.add_node("a", ExtentClass::Presentation, CategoryFlags::RENDER_MODEL).unwrap();
        let b = graph.add_node("b", ExtentClass::Presentation, CategoryFlags::RENDER_MODEL).unwrap();
        let c = graph.add_node("c", ExtentClass::Presentation, CategoryFlags::VIEWPORT).unwrap();
        graph.attach(a, "hdr", TextureFormat::R16G16B16A16_SFLOAT).unwrap();
        let reused = graph.attach(b, "hdr", TextureFormat::R16G16B16A16_SFLOAT).unwrap();
        graph.attach_swapchain(c).unwrap();
        graph.forward_as_sampled(reused, c, DescriptorSetType::COLOR_INPUT, 0).unwrap();
        graph.build(renderer).unwrap();
        graph
    });

    let hdr = f.handler.attachment_image("hdr").unwrap();
    assert!(hdr.texture.info().usage.contains(TextureUsage::SAMPLED | TextureUsage::COLOR_ATTACHMENT));
    let c = f.graph.node_id("c").unwrap();
    assert!(f.handler.node_descriptor_sets(c).unwrap().contains_key(&DescriptorSetType::COLOR_INPUT));
}

#[test]
fn test_cross_extent_name_collision_fails() {
    let renderer = MockRenderer::new();
    let mut graph = RenderGraph::new(&mock_device_info());
    let shadow = graph.add_node("shadow", ExtentClass::ShadowMap, CategoryFlags::RENDER_MODEL).unwrap();
    let scene = graph.add_node("scene", ExtentClass::Presentation, CategoryFlags::RENDER_MODEL).unwrap();
    graph.attach(shadow, "depth", MOCK_DEPTH_FORMAT).unwrap();
    graph.attach(scene, "depth", MOCK_DEPTH_FORMAT).unwrap();
    graph.build(&renderer).unwrap();

    let result = RenderGraphHandler::new(&renderer, &graph, &extents(), &MockDescriptorAllocator::new());
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
fn test_extent_classes_size_images() {
    let f = fixture(|renderer| {
        let mut graph = RenderGraph::new(&mock_device_info());
        let shadow = graph.add_node("shadow", ExtentClass::ShadowMap, CategoryFlags::RENDER_MODEL).unwrap();
        let scene = graph.add_node("scene", ExtentClass::Presentation, CategoryFlags::RENDER_MODEL).unwrap();
        let depth = graph.attach(shadow, "shadow_depth", MOCK_DEPTH_FORMAT).unwrap();
        graph.attach_swapchain(scene).unwrap();
        graph.forward_as_sampled(depth, scene, DescriptorSetType::SHADOW_MAP, 0).unwrap();
        graph.build(renderer).unwrap();
        graph
    });

    let info = f.handler.attachment_image("shadow_depth").unwrap().texture.info().clone();
    assert_eq!((info.width, info.height), (2048, 2048));
    assert_eq!(info.usage, TextureUsage::DEPTH_STENCIL_ATTACHMENT | TextureUsage::SAMPLED);
    assert_eq!(
        f.renderer.sampled_writes.lock().unwrap().clone(),
        vec!["ShadowMap binding 0 D32_FLOAT DepthStencilReadOnly".to_string()]
    );
}

#[test]
fn test_framebuffers_follow_pass_order() {
    let f = fixture(|renderer| {
        let mut graph = RenderGraph::new(&mock_device_info());
        let a = graph.add_node("gbuffer", ExtentClass::Presentation, CategoryFlags::RENDER_MODEL).unwrap();
        graph.attach(a, "depth", MOCK_DEPTH_FORMAT).unwrap();
        graph.attach(a, "albedo", TextureFormat::R8G8B8A8_UNORM).unwrap();
        graph.build(renderer).unwrap();
        graph
    });

    let id = f.graph.node_id("gbuffer").unwrap();
    let framebuffer = f.handler.node_framebuffer(id).unwrap();
    assert_eq!(framebuffer.formats(), &[TextureFormat::R8G8B8A8_UNORM, MOCK_DEPTH_FORMAT]);
    assert_eq!((framebuffer.width(), framebuffer.height()), (800, 600));
}

#[test]
fn test_swapchain_framebuffers_per_image() {
    let renderer = MockRenderer::new();
    let (graph, geometry, present) = color_to_sampled_graph(&renderer);
    let handler = RenderGraphHandler::new(&renderer, &graph, &extents(), &MockDescriptorAllocator::new()).unwrap();
    assert!(handler.node_framebuffer(present).is_none());

    let images = MockSwapchain::new(1024, 768, 3).images;
    let targets = handler.create_swapchain_framebuffers(&renderer, &graph, &images).unwrap();

    assert_eq!(targets.len(), 3);
    for (target, image) in targets.iter().zip(&images) {
        assert!(Arc::ptr_eq(target.image(), image));
        assert_eq!(target.for_node(present).unwrap().width(), 1024);
        assert!(target.for_node(geometry).is_none());
    }
}

// ============================================================================
// FRAME RECORDING
// ============================================================================

#[test]
fn test_single_barrier_between_sampled_passes() {
    let f = fixture(|renderer| color_to_sampled_graph(renderer).0);
    let (cmd, stats) = record(&f, &[]);

    assert_eq!(stats.passes, 2);
    assert_eq!(stats.barriers, 1);
    assert_eq!(cmd.count("pipeline_barrier"), 1);

    let first_end = cmd.position("end_render_pass").unwrap();
    let barrier = cmd.position("pipeline_barrier").unwrap();
    let second_begin = cmd.commands.iter().rposition(|c| c.starts_with("begin_render_pass")).unwrap();
    assert!(first_end < barrier && barrier < second_begin);
    assert_eq!(cmd.commands[barrier], "pipeline_barrier [R8G8B8A8_UNORM ColorAttachment->ShaderReadOnly]");

    let recorded = &cmd.barriers[0][0];
    assert!(Arc::ptr_eq(&recorded.texture, &f.handler.attachment_image("color").unwrap().texture));
    assert_eq!(recorded.aspect, ImageAspect::Color);
    assert_eq!(recorded.dst_stages, PipelineStages::FRAGMENT_SHADER);
    assert_eq!(recorded.dst_access, AccessFlags::SHADER_READ);
    assert!(recorded.by_region);
}

#[test]
fn test_sampled_depth_barrier_waits_on_fragment_tests() {
    let f = fixture(|renderer| {
        let mut graph = RenderGraph::new(&mock_device_info());
        let shadow = graph.add_node("shadow", ExtentClass::ShadowMap, CategoryFlags::RENDER_MODEL).unwrap();
        let scene = graph.add_node("scene", ExtentClass::Presentation, CategoryFlags::RENDER_MODEL).unwrap();
        let depth = graph.attach(shadow, "shadow_depth", MOCK_DEPTH_FORMAT).unwrap();
        graph.attach_swapchain(scene).unwrap();
        graph.forward_as_sampled(depth, scene, DescriptorSetType::SHADOW_MAP, 0).unwrap();
        graph.build(renderer).unwrap();
        graph
    });
    let (cmd, stats) = record(&f, &[]);

    assert_eq!(stats.barriers, 1);
    let barrier = cmd.position("pipeline_barrier").unwrap();
    assert_eq!(cmd.commands[barrier], "pipeline_barrier [D32_FLOAT DepthStencilAttachment->DepthStencilReadOnly]");
    assert!(barrier < cmd.commands.iter().rposition(|c| c.starts_with("begin_render_pass")).unwrap());

    let recorded = &cmd.barriers[0][0];
    assert!(Arc::ptr_eq(&recorded.texture, &f.handler.attachment_image("shadow_depth").unwrap().texture));
    assert_eq!(recorded.aspect, ImageAspect::Depth);
    assert_eq!(recorded.src_stages, PipelineStages::EARLY_FRAGMENT_TESTS | PipelineStages::LATE_FRAGMENT_TESTS);
    assert_eq!(recorded.src_access, AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE);
    assert_eq!(recorded.dst_stages, PipelineStages::FRAGMENT_SHADER);
    assert_eq!(recorded.dst_access, AccessFlags::SHADER_READ);
}

#[test]
fn test_out_of_order_edges_replay_after_source_barrier() {
    let f = fixture(|renderer| {
        let mut graph = RenderGraph::new(&mock_device_info());
        let a = graph.add_node("a", ExtentClass::Presentation, CategoryFlags::RENDER_MODEL).unwrap();
        let b = graph.add_node("b", ExtentClass::Presentation, CategoryFlags::RENDER_MODEL).unwrap();
        let c = graph.add_node("c", ExtentClass::Presentation, CategoryFlags::VIEWPORT).unwrap();
        let from_a = graph.attach(a, "from_a", TextureFormat::R8G8B8A8_UNORM).unwrap();
        let from_b = graph.attach(b, "from_b", TextureFormat::R16G16B16A16_SFLOAT).unwrap();
        graph.attach_swapchain(c).unwrap();
        graph.forward_as_sampled(from_b, c, DescriptorSetType::COLOR_INPUT, 0).unwrap();
        graph.forward_as_sampled(from_a, b, DescriptorSetType::COLOR_INPUT, 0).unwrap();
        graph.build(renderer).unwrap();
        graph
    });
    let (cmd, stats) = record(&f, &[]);

    assert_eq!(stats.passes, 3);
    assert_eq!(stats.barriers, 2);
    let passes: Vec<usize> = cmd.commands.iter().enumerate()
        .filter(|(_, c)| c.starts_with("begin_render_pass"))
        .map(|(i, _)| i)
        .collect();
    let a_barrier = cmd.position("pipeline_barrier [R8G8B8A8_UNORM").unwrap();
    let b_barrier = cmd.position("pipeline_barrier [R16G16B16A16_SFLOAT").unwrap();

    assert_eq!(cmd.commands[passes[0]], "begin_render_pass 800x600 [R8G8B8A8_UNORM]");
    assert_eq!(cmd.commands[passes[1]], "begin_render_pass 800x600 [R16G16B16A16_SFLOAT]");
    assert_eq!(cmd.commands[passes[2]], "begin_render_pass 800x600 [B8G8R8A8_SRGB]");
    assert!(passes[0] < a_barrier && a_barrier < passes[1]);
    assert!(passes[1] < b_barrier && b_barrier < passes[2]);
}

#[test]
fn test_attachment_forward_keeps_layout() {
    let f = fixture(|renderer| {
        let mut graph = RenderGraph::new(&mock_device_info());
        let scene = graph.add_node("scene", ExtentClass::Presentation, CategoryFlags::RENDER_MODEL).unwrap();
        let ui = graph.add_node("ui", ExtentClass::Presentation, CategoryFlags::UI_SHAPE).unwrap();
        let slot = graph.attach_swapchain(scene).unwrap();
        graph.forward_as_attachment(slot, ui).unwrap();
        graph.build(renderer).unwrap();
        graph
    });
    let (cmd, _) = record(&f, &[]);

    assert_eq!(cmd.count("pipeline_barrier"), 1);
    let recorded = &cmd.barriers[0][0];
    assert!(Arc::ptr_eq(&recorded.texture, f.swapchain[0].image()));
    assert_eq!(recorded.old_layout, ImageLayout::ColorAttachment);
    assert_eq!(recorded.new_layout, ImageLayout::ColorAttachment);
}

#[test]
fn test_clear_values_and_viewport_follow_framebuffer() {
    let f = fixture(|renderer| {
        let mut graph = RenderGraph::new(&mock_device_info());
        let shadow = graph.add_node("shadow", ExtentClass::ShadowMap, CategoryFlags::RENDER_MODEL).unwrap();
        graph.attach(shadow, "shadow_depth", MOCK_DEPTH_FORMAT).unwrap();
        graph.build(renderer).unwrap();
        graph
    });
    let (cmd, _) = record(&f, &[]);

    assert_eq!(cmd.commands, vec![
        "begin".to_string(),
        "begin_render_pass 2048x2048 [D32_FLOAT]".to_string(),
        "set_viewport 2048x2048".to_string(),
        "set_scissor 2048x2048".to_string(),
        "end_render_pass".to_string(),
        "end".to_string(),
    ]);
}

#[test]
fn test_category_filter_single_draw() {
    let f = fixture(|renderer| {
        let mut graph = RenderGraph::new(&mock_device_info());
        for (name, category) in [
            ("scene", CategoryFlags::RENDER_MODEL),
            ("ui", CategoryFlags::UI_SHAPE),
            ("post", CategoryFlags::VIEWPORT),
        ] {
            let node = graph.add_node(name, ExtentClass::Presentation, category).unwrap();
            graph.attach(node, &format!("{}_color", name), TextureFormat::R8G8B8A8_UNORM).unwrap();
        }
        graph.build(renderer).unwrap();
        graph
    });
    let model = RenderModel::new(CategoryFlags::RENDER_MODEL, pipeline(&[]), 36);
    let (cmd, stats) = record(&f, &[model]);

    assert_eq!(stats.passes, 3);
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(cmd.count("draw"), 1);
    assert_eq!(cmd.count("draw 36 x1"), 1);
}

#[test]
fn test_pipeline_bound_once_per_pass_and_sets_coalesced() {
    let f = fixture(|renderer| color_to_sampled_graph(renderer).0);
    let shared = pipeline(&[
        (0, DescriptorSetType::CAMERA),
        (1, DescriptorSetType::COLOR_INPUT),
        (2, DescriptorSetType::MODEL_MATRIX),
    ]);
    let models: Vec<RenderModel> = (0..2)
        .map(|_| {
            RenderModel::new(CategoryFlags::VIEWPORT, Arc::clone(&shared), 3)
                .with_descriptor_set(mock_set(DescriptorSetType::MODEL_MATRIX))
        })
        .collect();
    let mut scene_sets = DescriptorSetHolder::new();
    scene_sets.insert(DescriptorSetType::CAMERA, mock_set(DescriptorSetType::CAMERA));

    let mut cmd = MockCommandList::new();
    let stats = f.handler
        .fill_command_buffer(&mut cmd, &f.graph, &f.swapchain[0], &scene_sets, &models)
        .unwrap();

    assert_eq!(stats.pipeline_binds, 1);
    assert_eq!(stats.draw_calls, 2);
    // node set, scene set, then one model set per draw
    assert_eq!(stats.descriptor_binds, 4);
    let binds: Vec<&String> = cmd.commands.iter().filter(|c| c.starts_with("bind_descriptor_sets")).collect();
    assert_eq!(binds, vec![
        "bind_descriptor_sets 1 [ColorInput]",
        "bind_descriptor_sets 0 [Camera]",
        "bind_descriptor_sets 2 [ModelMatrix]",
        "bind_descriptor_sets 2 [ModelMatrix]",
    ]);
}

#[test]
fn test_replay_is_idempotent() {
    let f = fixture(|renderer| color_to_sampled_graph(renderer).0);
    let model = RenderModel::new(CategoryFlags::VIEWPORT, pipeline(&[]), 3);

    let (first, first_stats) = record(&f, std::slice::from_ref(&model));
    let (second, second_stats) = record(&f, std::slice::from_ref(&model));

    assert_eq!(first.commands, second.commands);
    assert_eq!(first_stats, second_stats);
}

#[test]
fn test_indexed_model_binds_u16_indices() {
    let f = fixture(|renderer| color_to_sampled_graph(renderer).0);
    let vertices: Arc<dyn Buffer> = Arc::new(MockBuffer::new(256, "vertices"));
    let indices: Arc<dyn Buffer> = Arc::new(MockBuffer::new(64, "indices"));
    let model = RenderModel::new(CategoryFlags::RENDER_MODEL, pipeline(&[]), 6)
        .with_vertex_buffer(vertices, 16)
        .with_index_buffer(indices, 0);

    let (cmd, stats) = record(&f, &[model]);

    assert_eq!(stats.draw_calls, 1);
    assert_eq!(cmd.count("bind_vertex_buffers 0 count=1 offsets=[16]"), 1);
    assert_eq!(cmd.count("bind_index_buffer U16 offset=0"), 1);
    assert_eq!(cmd.count("draw_indexed 6 x1"), 1);
}

#[test]
fn test_vertex_buffer_offset_mismatch_fails() {
    let f = fixture(|renderer| color_to_sampled_graph(renderer).0);
    let mut model = RenderModel::new(CategoryFlags::RENDER_MODEL, pipeline(&[]), 3)
        .with_vertex_buffer(Arc::new(MockBuffer::new(64, "vertices")), 0);
    model.vertex_buffer_offsets.push(32);

    let mut cmd = MockCommandList::new();
    let result = f.handler.fill_command_buffer(&mut cmd, &f.graph, &f.swapchain[0], &DescriptorSetHolder::new(), &[model]);
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}
