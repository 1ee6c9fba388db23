//! Integration tests for topology construction
//!
//! These tests validate building graphs from descriptions:
//! - The default media controller layout
//! - Atomic rollback on a bad description
//! - Descriptions loaded from TOML configuration files

mod common;

use common::{dequeue_n, manual_params, queue_buffers};
use std::sync::Arc;
use tempfile::TempDir;
use vimc_rs::config::{EntityConfig, LinkConfig};
use vimc_rs::pipeline::{
    pixfmt::code, BufferState, EntityKind, FourCc, MbusFormat, PadId, PipelineError, StreamState,
};
use vimc_rs::{
    EntityRegistry, MediaGraph, SimConfig, SimError, TopologyBuilder, TopologyConfig, VideoNode,
};

fn default_graph() -> (Arc<MediaGraph>, vimc_rs::Topology) {
    let graph = Arc::new(MediaGraph::new(manual_params()));
    let registry = EntityRegistry::with_builtins();
    let topology = TopologyBuilder::new(&registry)
        .build(&graph, &TopologyConfig::default())
        .unwrap();
    (graph, topology)
}

#[test]
fn test_default_topology_shape() {
    let (graph, topology) = default_graph();
    assert_eq!(topology.entities.len(), 9);
    assert_eq!(topology.links.len(), 8);

    let snapshot = graph.snapshot();
    let kind_of = |name: &str| {
        snapshot
            .entities
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.kind)
    };
    assert_eq!(kind_of("Sensor B"), Some(EntityKind::Sensor));
    assert_eq!(kind_of("RGB/YUV Input"), Some(EntityKind::Output));
    assert_eq!(kind_of("Scaler"), Some(EntityKind::Scaler));

    let input_link = snapshot
        .links
        .iter()
        .find(|l| l.source == "RGB/YUV Input:0")
        .unwrap();
    assert_eq!(input_link.sink, "Scaler:0");
    assert!(!input_link.enabled);
    assert!(!input_link.immutable);
}

#[test]
fn test_stream_rgb_capture_from_default_topology() {
    let (graph, topology) = default_graph();
    let sensor_a = topology.entity("Sensor A").unwrap();
    graph
        .set_format(
            PadId::new(sensor_a, 0),
            &MbusFormat::new(16, 8, code::SRGGB8_1X8),
        )
        .unwrap();

    let node = VideoNode::open_by_name(graph.clone(), "RGB/YUV Capture").unwrap();
    graph.sync_formats(node.entity()).unwrap();
    let format = node.format().unwrap();
    assert_eq!((format.width, format.height), (48, 24));
    assert_eq!(format.pixelformat, FourCc::RGB24);

    queue_buffers(&node, 2);
    node.stream_on().unwrap();

    // Only the entities feeding the endpoint start
    let sensor_b = topology.entity("Sensor B").unwrap();
    let raw_0 = topology.entity("Raw Capture 0").unwrap();
    assert_eq!(graph.entity_state(sensor_a).unwrap(), StreamState::Streaming);
    assert_eq!(graph.entity_state(sensor_b).unwrap(), StreamState::Stopped);
    assert_eq!(graph.entity_state(raw_0).unwrap(), StreamState::Stopped);

    graph.inject_frame(sensor_a, &[0x20; 16 * 8]).unwrap();
    let done = dequeue_n(&node, 1);
    assert_eq!(done[0].state(), BufferState::Done);
    assert_eq!(done[0].bytes_used, 48 * 24 * 3);

    node.stream_off();
    assert_eq!(graph.entity_state(sensor_a).unwrap(), StreamState::Stopped);
}

#[test]
fn test_switching_scaler_input() {
    let (graph, topology) = default_graph();
    let deb_a = topology.entity("Debayer A").unwrap();
    let deb_b = topology.entity("Debayer B").unwrap();
    let scaler = topology.entity("Scaler").unwrap();

    let a_link = graph
        .find_link(PadId::new(deb_a, 1), PadId::new(scaler, 0))
        .unwrap();
    let b_link = graph
        .find_link(PadId::new(deb_b, 1), PadId::new(scaler, 0))
        .unwrap();

    // One enabled link per sink pad
    assert!(matches!(
        graph.setup_link(b_link, true),
        Err(PipelineError::InvalidArgument(_))
    ));
    graph.setup_link(a_link, false).unwrap();
    graph.setup_link(b_link, true).unwrap();

    let capture = topology.entity("RGB/YUV Capture").unwrap();
    let plan = graph.plan(capture).unwrap();
    assert!(plan.contains(topology.entity("Sensor B").unwrap()));
    assert!(!plan.contains(topology.entity("Sensor A").unwrap()));
}

#[test]
fn test_unresolved_link_rolls_back() {
    let graph = MediaGraph::new(manual_params());
    let registry = EntityRegistry::with_builtins();
    let mut config = TopologyConfig::default();
    config
        .links
        .push(LinkConfig::disabled("Sensor C:0->Debayer A:0"));

    let err = TopologyBuilder::new(&registry)
        .build(&graph, &config)
        .unwrap_err();
    assert!(matches!(err, SimError::Topology(_)));
    assert!(graph.entity_ids().is_empty());
    assert!(graph.links().is_empty());
}

#[test]
fn test_invalid_link_rolls_back() {
    let graph = MediaGraph::new(manual_params());
    let registry = EntityRegistry::with_builtins();
    let mut config = TopologyConfig::default();
    // Second enabled link into the scaler sink
    config.links[5].enabled = true;

    let err = TopologyBuilder::new(&registry)
        .build(&graph, &config)
        .unwrap_err();
    assert!(matches!(
        err.pipeline_error(),
        Some(PipelineError::InvalidArgument(_))
    ));
    assert!(graph.entity_ids().is_empty());
}

#[test]
fn test_custom_driver_registration() {
    let graph = MediaGraph::new(manual_params());
    let mut registry = EntityRegistry::with_builtins();
    registry.register(
        "test-sensor",
        Box::new(|spec| {
            let pads = spec.pads.unwrap_or(EntityKind::Sensor.default_pads()).to_vec();
            let entity =
                vimc_rs::pipeline::BuiltinEntity::build(EntityKind::Sensor, pads, spec.params)?;
            Ok(entity.into())
        }),
    );
    let config = TopologyConfig {
        entities: vec![
            EntityConfig::new("test-sensor:Pattern"),
            EntityConfig::new("capture:Sink"),
        ],
        links: vec![LinkConfig::enabled("Pattern:0->Sink:0")],
    };
    let topology = TopologyBuilder::new(&registry)
        .build(&graph, &config)
        .unwrap();
    assert_eq!(topology.links.len(), 1);
}

#[test]
fn test_topology_from_toml_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vimc.toml");
    std::fs::write(
        &path,
        r#"
        [pipeline]
        frame_rate_hz = 0
        scaler_multiplier = 2

        [[topology.entities]]
        node = "vimc-sensor:Cam"

        [[topology.entities]]
        node = "vimc-scaler:Scale"
        pads = [{ direction = "sink" }, { direction = "source" }]

        [[topology.entities]]
        node = "vimc-capture:Out"

        [[topology.links]]
        path = "Cam:0->Scale:0"
        immutable = true

        [[topology.links]]
        path = "Scale:1->Out:0"
        "#,
    )
    .unwrap();

    let config = SimConfig::load(&path).unwrap();
    assert_eq!(config.pipeline.scaler_multiplier, 2);
    let graph = Arc::new(MediaGraph::new(config.pipeline.entity_params()));
    let registry = EntityRegistry::with_builtins();
    let topology = TopologyBuilder::new(&registry)
        .build(&graph, &config.topology)
        .unwrap();

    let cam = topology.entity("Cam").unwrap();
    // The scaler only accepts non-bayer input
    graph
        .set_format(PadId::new(cam, 0), &MbusFormat::new(4, 2, code::RGB888_1X24))
        .unwrap();
    let node = VideoNode::open_by_name(graph.clone(), "Out").unwrap();
    graph.sync_formats(node.entity()).unwrap();
    let format = node.format().unwrap();
    assert_eq!((format.width, format.height), (8, 4));

    queue_buffers(&node, 1);
    node.stream_on().unwrap();
    graph.inject_frame(cam, &[7; 4 * 2 * 3]).unwrap();
    let done = dequeue_n(&node, 1);
    assert!(done[0].payload().iter().all(|&b| b == 7));
    node.stream_off();
}
