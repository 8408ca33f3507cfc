/// Render graph declaration: nodes, attachments and forwarding edges
///
/// Nodes live in an arena addressed by `NodeId`; attachments are addressed by
/// `AttachmentRef { node, index }`. Edges raise the destination's level as they
/// are declared, and `build()` settles the final levels, rejects cycles and
/// creates one render pass per node.

use std::collections::VecDeque;
use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use crate::error::{Error, Result};
use crate::renderer::{DescriptorSetType, DeviceInfo, ExtentClass, Renderer, TextureFormat};
use super::attachment::{Attachment, AttachmentRef, Dependency, ForwardMode, SWAPCHAIN_ATTACHMENT_NAME};
use super::render_model::CategoryFlags;
use super::render_node::{NodeId, RenderNode};

fn graph_error(message: String) -> Error {
    crate::engine_error!("rendergraph::RenderGraph", "{}", message);
    Error::InvalidGraph(message)
}

/// Render graph
pub struct RenderGraph {
    nodes: SlotMap<NodeId, RenderNode>,
    /// Arena order
    insertion: Vec<NodeId>,
    names: FxHashMap<String, NodeId>,
    presentation_format: TextureFormat,
    built: bool,
}

impl RenderGraph {
    /// Empty graph; the swapchain slot takes `device_info.presentation_format`
    pub fn new(device_info: &DeviceInfo) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            insertion: Vec::new(),
            names: FxHashMap::default(),
            presentation_format: device_info.presentation_format,
            built: false,
        }
    }

    // ===== DECLARATION =====

    /// Add a node
    ///
    /// # Errors
    ///
    /// `InvalidGraph` if the name is taken or the graph is already built.
    pub fn add_node(&mut self, name: &str, extent_class: ExtentClass, category_filter: CategoryFlags) -> Result<NodeId> {
        self.ensure_not_built("add node")?;
        if self.names.contains_key(name) {
            return Err(graph_error(format!("node '{}' already exists", name)));
        }

        let id = self.nodes.insert(RenderNode::new(name, extent_class, category_filter));
        self.insertion.push(id);
        self.names.insert(name.to_string(), id);
        crate::engine_trace!("rendergraph::RenderGraph", "Added node '{}' ({:?})", name, extent_class);
        Ok(id)
    }

    /// Builder over one node's attachment list
    pub fn node_builder(&mut self, node: NodeId) -> Result<NodeBuilder<'_>> {
        self.node_checked(node)?;
        Ok(NodeBuilder { graph: self, node })
    }

    /// Append an attachment to `node`
    pub fn attach(&mut self, node: NodeId, name: &str, format: TextureFormat) -> Result<AttachmentRef> {
        if name == SWAPCHAIN_ATTACHMENT_NAME {
            return Err(graph_error(format!(
                "'{}' is reserved, use attach_swapchain()", SWAPCHAIN_ATTACHMENT_NAME
            )));
        }
        self.push_attachment(node, Attachment::new(name, format, false, node))
    }

    /// Append the swapchain slot to `node`; the node then renders into the swapchain framebuffer
    pub fn attach_swapchain(&mut self, node: NodeId) -> Result<AttachmentRef> {
        let attachment = Attachment::new(SWAPCHAIN_ATTACHMENT_NAME, self.presentation_format, true, node);
        let reference = self.push_attachment(node, attachment)?;
        self.nodes[node].use_swapchain_framebuffer = true;
        Ok(reference)
    }

    /// Hand `from` to `to_node` as a framebuffer attachment
    ///
    /// `to_node` gets an attachment with the same name, format and swapchain flag,
    /// so both nodes render into the same image; the second one loads it.
    ///
    /// # Errors
    ///
    /// `InvalidGraph` for unknown handles, self edges, different extent classes,
    /// or a source that is already sampled.
    pub fn forward_as_attachment(&mut self, from: AttachmentRef, to_node: NodeId) -> Result<AttachmentRef> {
        self.check_edge(from, to_node)?;
        self.check_single_forward_mode(from, false)?;

        let from_class = self.nodes[from.node].extent_class();
        let to_class = self.nodes[to_node].extent_class();
        if from_class != to_class {
            return Err(graph_error(format!(
                "cannot forward '{}' from '{}' ({:?}) to '{}' ({:?}) as attachment: extent classes differ",
                self.nodes[from.node].attachments[from.index].name,
                self.nodes[from.node].name(), from_class,
                self.nodes[to_node].name(), to_class
            )));
        }

        let source = &self.nodes[from.node].attachments[from.index];
        let mut forwarded = Attachment::new(&source.name, source.format, source.is_swapchain, to_node);
        forwarded.forwarded_from = Some(from);
        let is_swapchain = forwarded.is_swapchain;

        let reference = self.push_attachment(to_node, forwarded)?;
        if is_swapchain {
            self.nodes[to_node].use_swapchain_framebuffer = true;
        }
        self.record_edge(from, to_node, ForwardMode::AsFramebufferAttachment);
        Ok(reference)
    }

    /// Let `to_node` sample `from` at `binding` of its `set_type` set
    ///
    /// Returns `from` so several consumers can be chained. A source already
    /// forwarded as a framebuffer attachment cannot also be sampled.
    pub fn forward_as_sampled(
        &mut self,
        from: AttachmentRef,
        to_node: NodeId,
        set_type: DescriptorSetType,
        binding: u32,
    ) -> Result<AttachmentRef> {
        self.check_edge(from, to_node)?;
        self.check_single_forward_mode(from, true)?;

        let taken = self.all_dependencies().any(|d| {
            d.to_node == to_node
                && d.mode == ForwardMode::AsSampledDescriptor { set_type, binding }
        });
        if taken {
            return Err(graph_error(format!(
                "binding {} of the {} set of '{}' is already fed",
                binding, set_type, self.nodes[to_node].name()
            )));
        }

        self.record_edge(from, to_node, ForwardMode::AsSampledDescriptor { set_type, binding });
        Ok(from)
    }

    // ===== BUILD =====

    /// Settle node levels, reject cycles and create every node's render pass
    pub fn build(&mut self, renderer: &dyn Renderer) -> Result<()> {
        self.ensure_not_built("build")?;
        self.settle_orders()?;

        let depth_format = renderer.device_info().depth_format;
        for &id in &self.insertion {
            let node = &self.nodes[id];
            let desc = node.render_pass_desc(depth_format)?;
            let render_pass = renderer.create_render_pass(&desc)?;
            crate::engine_debug!(
                "rendergraph::RenderGraph",
                "Node '{}' level {}: {} color + {} depth attachments",
                node.name(), node.order(), desc.color_attachments.len(),
                usize::from(desc.depth_attachment.is_some())
            );
            self.nodes[id].render_pass = Some(render_pass);
        }

        self.built = true;
        crate::engine_info!(
            "rendergraph::RenderGraph",
            "Render graph built: {} nodes over {} levels",
            self.insertion.len(),
            self.max_order().map_or(0, |m| m + 1)
        );
        Ok(())
    }

    // Longest-path levels over the edge set. Nodes left unvisited sit on a cycle.
    fn settle_orders(&mut self) -> Result<()> {
        let mut successors: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();
        let mut in_degree: FxHashMap<NodeId, usize> = self.insertion.iter().map(|&id| (id, 0)).collect();
        for dependency in self.all_dependencies() {
            successors.entry(dependency.from.node).or_default().push(dependency.to_node);
            *in_degree.entry(dependency.to_node).or_default() += 1;
        }

        let mut levels: FxHashMap<NodeId, u32> = self.insertion.iter().map(|&id| (id, self.nodes[id].order)).collect();
        let mut ready: VecDeque<NodeId> = self.insertion.iter().copied().filter(|id| in_degree[id] == 0).collect();
        let mut visited = 0;

        while let Some(id) = ready.pop_front() {
            visited += 1;
            let level = levels[&id];
            for &next in successors.get(&id).map(Vec::as_slice).unwrap_or(&[]) {
                let entry = levels.entry(next).or_default();
                *entry = (*entry).max(level + 1);
                let degree = in_degree.entry(next).or_default();
                *degree -= 1;
                if *degree == 0 {
                    ready.push_back(next);
                }
            }
        }

        if visited != self.insertion.len() {
            let on_cycle: Vec<&str> = self.insertion.iter()
                .filter(|id| in_degree[*id] > 0)
                .map(|&id| self.nodes[id].name())
                .collect();
            return Err(graph_error(format!("cycle between nodes {:?}", on_cycle)));
        }

        for (id, level) in levels {
            self.nodes[id].order = level;
        }
        Ok(())
    }

    // ===== QUERIES =====

    pub fn is_built(&self) -> bool {
        self.built
    }

    pub fn node(&self, id: NodeId) -> Option<&RenderNode> {
        self.nodes.get(id)
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn node_by_name(&self, name: &str) -> Option<&RenderNode> {
        self.node_id(name).and_then(|id| self.nodes.get(id))
    }

    /// Nodes in arena (insertion) order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &RenderNode)> + '_ {
        self.insertion.iter().map(move |&id| (id, &self.nodes[id]))
    }

    pub fn node_count(&self) -> usize {
        self.insertion.len()
    }

    /// Nodes at execution level `level`, in arena order
    pub fn nodes_at_order(&self, level: u32) -> Vec<NodeId> {
        self.nodes()
            .filter(|(_, node)| node.order() == level)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn max_order(&self) -> Option<u32> {
        self.nodes().map(|(_, node)| node.order()).max()
    }

    pub fn attachment(&self, reference: AttachmentRef) -> Option<&Attachment> {
        self.nodes.get(reference.node).and_then(|node| node.attachments.get(reference.index))
    }

    /// Every edge of the graph, grouped by source node in arena order
    pub fn all_dependencies(&self) -> impl Iterator<Item = &Dependency> + '_ {
        self.nodes()
            .flat_map(|(_, node)| node.attachments.iter())
            .flat_map(|attachment| attachment.dependencies.iter())
    }

    // ===== INTERNALS =====

    fn ensure_not_built(&self, what: &str) -> Result<()> {
        if self.built {
            return Err(graph_error(format!("cannot {} once the graph is built", what)));
        }
        Ok(())
    }

    fn node_checked(&self, id: NodeId) -> Result<&RenderNode> {
        self.nodes.get(id).ok_or_else(|| graph_error(format!("unknown node {:?}", id)))
    }

    fn push_attachment(&mut self, node: NodeId, attachment: Attachment) -> Result<AttachmentRef> {
        self.ensure_not_built("attach")?;
        let target = self.node_checked(node)?;
        if target.attachment_by_name(&attachment.name).is_some() {
            return Err(graph_error(format!(
                "node '{}' already has an attachment named '{}'",
                target.name(), attachment.name
            )));
        }

        let attachments = &mut self.nodes[node].attachments;
        attachments.push(attachment);
        Ok(AttachmentRef { node, index: attachments.len() - 1 })
    }

    fn check_edge(&self, from: AttachmentRef, to_node: NodeId) -> Result<()> {
        self.ensure_not_built("forward")?;
        if self.attachment(from).is_none() {
            return Err(graph_error(format!("unknown attachment {:?}", from)));
        }
        self.node_checked(to_node)?;
        if from.node == to_node {
            return Err(graph_error(format!(
                "node '{}' cannot forward an attachment to itself",
                self.nodes[to_node].name()
            )));
        }
        Ok(())
    }

    // Every edge of an attachment is barriered in one batch after its source level,
    // so one image cannot both stay an attachment and become shader readable.
    fn check_single_forward_mode(&self, from: AttachmentRef, sampled: bool) -> Result<()> {
        let source = &self.nodes[from.node].attachments[from.index];
        match source.dependencies.iter().find(|d| d.is_sampled() != sampled) {
            Some(existing) => Err(graph_error(format!(
                "'{}' of '{}' is already forwarded to '{}' {}",
                source.name,
                self.nodes[from.node].name(),
                self.nodes[existing.to_node].name(),
                if existing.is_sampled() { "as sampled image" } else { "as attachment" }
            ))),
            None => Ok(()),
        }
    }

    fn record_edge(&mut self, from: AttachmentRef, to_node: NodeId, mode: ForwardMode) {
        self.nodes[from.node].attachments[from.index]
            .dependencies
            .push(Dependency { from, to_node, mode });

        let raised = self.nodes[from.node].order + 1;
        let target = &mut self.nodes[to_node];
        target.order = target.order.max(raised);
    }
}

/// Attachment declarations for one node
pub struct NodeBuilder<'g> {
    graph: &'g mut RenderGraph,
    node: NodeId,
}

impl NodeBuilder<'_> {
    pub fn id(&self) -> NodeId {
        self.node
    }

    pub fn attach(&mut self, name: &str, format: TextureFormat) -> Result<AttachmentRef> {
        self.graph.attach(self.node, name, format)
    }

    pub fn attach_swapchain(&mut self) -> Result<AttachmentRef> {
        self.graph.attach_swapchain(self.node)
    }
}

#[cfg(test)]
#[path = "render_graph_tests.rs"]
mod tests;
