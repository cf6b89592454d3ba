//! Frame loop integration tests on the headless backend.
//!
//! The headless backend replays every submitted command list against the
//! actual state of each image and records a violation for anything a
//! validation layer would flag, so most tests end by asserting there are none.

use std::time::Duration;

use glam::{Mat4, Vec3};

use vista_core::{FailurePolicy, RendererConfig};
use vista_renderer::{
    DrawItem, DrawListAssembler, FramePath, FrameTarget, MsaaState, PerFrameConstants,
    PerSceneConstants, Renderer, RendererError, SlotState, TextureClass,
};
use vista_resources::TextureData;
use vista_rhi::headless::{HeadlessBackend, HeadlessConfig, HeadlessEvent, HeadlessProbe};
use vista_rhi::{
    Backend, Command, DescriptorView, Extent2D, PresentStatus, ResourceState, SampleCount,
    SampleCountSet, ScissorRect, Viewport,
};
use vista_scene::{PrimitiveType, RenderPipeline, Scene, SceneLighting, SceneObject};

fn quiet() -> HeadlessConfig {
    HeadlessConfig {
        gpu_latency: Duration::ZERO,
        ..Default::default()
    }
}

fn start(
    headless: HeadlessConfig,
    config: RendererConfig,
) -> (Renderer<HeadlessBackend>, HeadlessProbe) {
    let backend = HeadlessBackend::new(headless);
    let probe = backend.probe();
    let renderer = match Renderer::new(backend, &config) {
        Ok(renderer) => renderer,
        Err(e) => panic!("Failed to create renderer: {e}"),
    };
    (renderer, probe)
}

fn demo_scene() -> Scene {
    let mut scene = Scene::new();
    scene
        .add(SceneObject::primitive("box", PrimitiveType::Cube))
        .unwrap();
    scene.add(SceneObject::height_field("terrain", None)).unwrap();
    scene.add(SceneObject::sky("sky", None)).unwrap();
    scene
}

fn draw_items(renderer: &Renderer<HeadlessBackend>, scene: &Scene) -> Vec<DrawItem> {
    let mut assembler = DrawListAssembler::new(*renderer.descriptor_layout());
    assembler.assemble(scene).to_vec()
}

fn run_frame(renderer: &mut Renderer<HeadlessBackend>, items: &[DrawItem]) -> PresentStatus {
    renderer.begin_frame().unwrap();
    assert!(renderer.is_recording());
    renderer.submit_draw_list(items).unwrap();
    let status = renderer.end_frame(true).unwrap();
    assert!(!renderer.is_recording());
    status
}

fn assert_clean(probe: &HeadlessProbe) {
    let violations = probe.violations();
    assert!(violations.is_empty(), "validation violations: {violations:#?}");
}

/// Check every image touched by the last frame against the path's reference sequence.
fn assert_path(renderer: &Renderer<HeadlessBackend>, path: FramePath) {
    let tracker = renderer.state_tracker();
    let mut checked = Vec::new();
    for transition in renderer.transitions() {
        if checked.contains(&transition.image) {
            continue;
        }
        checked.push(transition.image);
        assert_eq!(
            tracker.visited_states(transition.image),
            path.expected_states(transition.target),
            "{} on the {:?} path",
            transition.target,
            path
        );
    }
    assert!(
        renderer
            .transitions()
            .iter()
            .any(|t| t.target == FrameTarget::Backbuffer)
    );
}

#[test]
fn test_ten_frames_cycle_slots() {
    let (mut renderer, probe) = start(quiet(), RendererConfig::default());
    let items = draw_items(&renderer, &demo_scene());

    let mut slots = Vec::new();
    for _ in 0..10 {
        slots.push(renderer.frame_slot());
        assert_eq!(run_frame(&mut renderer, &items), PresentStatus::Presented);
    }

    assert_eq!(slots, [0, 1, 2, 0, 1, 2, 0, 1, 2, 0]);
    let submitted: Vec<usize> = probe.submissions().iter().map(|(slot, _)| *slot).collect();
    assert_eq!(submitted, slots);
    assert_eq!(
        probe.count(|e| matches!(e, HeadlessEvent::Present { vsync: true, .. })),
        10
    );
    assert_eq!(renderer.frames_submitted(), 10);
    for (_, commands) in probe.submissions() {
        let draws = commands
            .iter()
            .filter(|c| matches!(c, Command::Draw { .. }))
            .count();
        assert_eq!(draws, items.len());
    }
    assert_clean(&probe);
}

#[test]
fn test_slot_never_rerecorded_before_its_fence() {
    let headless = HeadlessConfig {
        gpu_latency: Duration::from_millis(3),
        ..Default::default()
    };
    let config = RendererConfig {
        frames_in_flight: 2,
        ..Default::default()
    };
    let (mut renderer, probe) = start(headless, config);
    let items = draw_items(&renderer, &demo_scene());

    for _ in 0..12 {
        renderer.begin_frame().unwrap();
        let slot = renderer.frame_slot();
        assert!(renderer.backend().completed_fence_value() >= renderer.fences().watermark(slot));
        assert_eq!(renderer.slot_state(slot), SlotState::Recording);
        renderer.submit_draw_list(&items).unwrap();
        renderer.end_frame(false).unwrap();
    }

    assert_eq!(renderer.fences().next_value(), 13);
    // Two slots against a 3ms GPU: the CPU catches up and has to block.
    assert!(renderer.fences().wait_count() > 0);
    assert!(probe.count(|e| matches!(e, HeadlessEvent::Wait { .. })) > 0);
    assert_clean(&probe);
}

#[test]
fn test_direct_path_transitions() {
    let (mut renderer, probe) = start(quiet(), RendererConfig::default());
    let items = draw_items(&renderer, &demo_scene());

    for _ in 0..4 {
        run_frame(&mut renderer, &items);
        assert_path(&renderer, FramePath::Direct);
        assert_eq!(
            renderer.state_tracker().visited_states(renderer.depth_buffer().unwrap()),
            [ResourceState::DepthWrite]
        );
    }
    assert_clean(&probe);
}

#[test]
fn test_resolve_path_transitions() {
    let (mut renderer, probe) = start(quiet(), RendererConfig::default());
    let items = draw_items(&renderer, &demo_scene());
    renderer.set_msaa(true, 4).unwrap();
    assert_eq!(renderer.msaa_state(), MsaaState::Enabled(SampleCount::X4));

    for _ in 0..4 {
        run_frame(&mut renderer, &items);
        assert_path(&renderer, FramePath::Resolve);
    }

    let (_, commands) = probe.submissions().pop().unwrap();
    assert_eq!(
        commands
            .iter()
            .filter(|c| matches!(c, Command::Resolve { .. }))
            .count(),
        1
    );
    assert_clean(&probe);
}

#[test]
fn test_msaa_off_again_releases_targets() {
    let (mut renderer, probe) = start(quiet(), RendererConfig::default());
    let items = draw_items(&renderer, &demo_scene());

    renderer.set_msaa(true, 4).unwrap();
    run_frame(&mut renderer, &items);
    renderer.set_msaa(false, 1).unwrap();

    assert_eq!(renderer.msaa_state(), MsaaState::Disabled);
    assert!(renderer.msaa_targets().is_none());
    assert!(
        probe
            .live_images()
            .iter()
            .all(|(_, image)| !image.desc.samples.is_multisampled())
    );

    run_frame(&mut renderer, &items);
    assert_path(&renderer, FramePath::Direct);
    let (_, commands) = probe.submissions().pop().unwrap();
    assert!(!commands.iter().any(|c| matches!(c, Command::Resolve { .. })));
    assert_clean(&probe);
}

#[test]
fn test_unsupported_msaa_rejected_without_side_effects() {
    let headless = HeadlessConfig {
        supported_samples: SampleCountSet::from_counts([SampleCount::X2]),
        ..quiet()
    };
    let (mut renderer, probe) = start(headless, RendererConfig::default());
    renderer.set_msaa(true, 2).unwrap();
    let waits = renderer.fences().full_wait_count();

    let err = renderer.set_msaa(true, 8).unwrap_err();
    assert!(matches!(err, RendererError::UnsupportedSampleCount(8)));
    assert_eq!(renderer.msaa_state(), MsaaState::Enabled(SampleCount::X2));
    assert_eq!(renderer.fences().full_wait_count(), waits);
    assert_clean(&probe);
}

#[test]
fn test_unsupported_startup_msaa_starts_disabled() {
    let headless = HeadlessConfig {
        supported_samples: SampleCountSet::single(),
        ..quiet()
    };
    let config = RendererConfig {
        msaa_samples: 4,
        ..Default::default()
    };
    let (renderer, _probe) = start(headless, config);
    assert_eq!(renderer.msaa_state(), MsaaState::Disabled);
}

#[test]
fn test_resize_recreates_targets_once() {
    let (mut renderer, probe) = start(quiet(), RendererConfig::default());
    let items = draw_items(&renderer, &demo_scene());
    renderer.set_msaa(true, 4).unwrap();
    for _ in 0..4 {
        run_frame(&mut renderer, &items);
    }

    let old_backbuffers = renderer.backbuffers().to_vec();
    let old_depth = renderer.depth_buffer().unwrap();
    let full_waits = renderer.fences().full_wait_count();
    probe.clear_events();

    assert!(renderer.on_resize(1920, 1080).unwrap());

    let extent = Extent2D::new(1920, 1080);
    assert_eq!(renderer.fences().full_wait_count(), full_waits + 1);
    assert_eq!(probe.count(|e| matches!(e, HeadlessEvent::Wait { .. })), 1);
    assert_eq!(probe.count(|e| matches!(e, HeadlessEvent::ResizeSurface { .. })), 1);
    assert_eq!(renderer.surface_extent(), extent);

    assert_eq!(renderer.backbuffers().len(), old_backbuffers.len());
    for image in renderer.backbuffers() {
        assert!(!old_backbuffers.contains(image));
        assert_eq!(probe.image(*image).unwrap().desc.extent, extent);
    }
    let depth = renderer.depth_buffer().unwrap();
    assert_ne!(depth, old_depth);
    assert_eq!(probe.image(depth).unwrap().desc.extent, extent);
    assert_eq!(renderer.msaa_targets().unwrap().extent, extent);

    run_frame(&mut renderer, &items);
    let (_, commands) = probe.submissions().pop().unwrap();
    assert!(commands.contains(&Command::SetViewport(Viewport::full(extent))));
    assert!(commands.contains(&Command::SetScissor(ScissorRect::full(extent))));
    assert_clean(&probe);
}

#[test]
fn test_minimized_window_ignored() {
    let (mut renderer, _probe) = start(quiet(), RendererConfig::default());
    assert!(!renderer.on_resize(0, 0).unwrap());
    assert_eq!(renderer.fences().full_wait_count(), 0);
    assert_eq!(renderer.surface_extent(), Extent2D::new(1280, 720));
}

#[test]
fn test_heightmap_class_exhaustion() {
    let (mut renderer, probe) = start(quiet(), RendererConfig::default());
    let layout = *renderer.descriptor_layout();
    let pixel = TextureData::from_rgba8(1, 1, vec![10, 20, 30, 255]).unwrap();

    let mut indices = Vec::new();
    for _ in 0..256 {
        indices.push(
            renderer
                .register_texture_data(&pixel, TextureClass::Heightmap)
                .unwrap(),
        );
    }
    let expected: Vec<u32> = (layout.heightmap_srv..layout.sky_srv).collect();
    assert_eq!(indices, expected);

    let populated = probe.populated_descriptors();
    let images = probe.live_images().len();
    let err = renderer
        .register_texture_data(&pixel, TextureClass::Heightmap)
        .unwrap_err();

    assert!(matches!(
        err,
        RendererError::OutOfSlots {
            class: TextureClass::Heightmap,
            capacity: 256
        }
    ));
    assert_eq!(probe.populated_descriptors(), populated);
    assert_eq!(probe.live_images().len(), images);
    assert_eq!(probe.descriptor(layout.sky_srv), None);
    assert_eq!(renderer.registered_textures(TextureClass::Heightmap), 256);
    assert_eq!(renderer.registered_textures(TextureClass::Sky), 0);
}

#[test]
fn test_register_texture_from_file() {
    let (mut renderer, probe) = start(quiet(), RendererConfig::default());
    let path = std::env::temp_dir().join(format!("vista_renderer_{}_sky.png", std::process::id()));
    image::RgbaImage::from_pixel(8, 4, image::Rgba([1, 2, 3, 255]))
        .save(&path)
        .expect("Failed to write test image");

    let index = renderer.register_texture(&path, TextureClass::Sky);
    std::fs::remove_file(&path).ok();
    let index = index.unwrap();

    assert_eq!(index, renderer.descriptor_layout().sky_srv);
    let Some(DescriptorView::Texture(image)) = probe.descriptor(index) else {
        panic!("sky descriptor not written");
    };
    assert_eq!(probe.image(image).unwrap().desc.extent, Extent2D::new(8, 4));

    let missing = renderer.register_texture(&path, TextureClass::Sky);
    assert!(matches!(missing, Err(RendererError::Resource(_))));
    assert_eq!(renderer.registered_textures(TextureClass::Sky), 1);
}

#[test]
fn test_camera_written_into_slot_constants() {
    let (mut renderer, probe) = start(quiet(), RendererConfig::default());
    let view = Mat4::look_at_rh(Vec3::new(0.0, 2.0, 6.0), Vec3::ZERO, Vec3::Y);
    let projection = Mat4::perspective_rh(1.0, 16.0 / 9.0, 0.1, 100.0);
    renderer.update_camera(view, projection).unwrap();

    run_frame(&mut renderer, &[]);

    let Some(DescriptorView::Constants { buffer, .. }) = probe.descriptor(0) else {
        panic!("slot 0 constants not bound");
    };
    let bytes = probe.buffer_contents(buffer).unwrap();
    let constants: PerFrameConstants = bytemuck::pod_read_unaligned(&bytes);
    assert_eq!(constants.view, view);
    assert_eq!(constants.projection, projection);
}

#[test]
fn test_default_lighting_written_at_startup() {
    let (renderer, probe) = start(quiet(), RendererConfig::default());
    let index = renderer.descriptor_layout().per_scene_cbv;
    let Some(DescriptorView::Constants { buffer, size }) = probe.descriptor(index) else {
        panic!("scene constants not bound");
    };
    assert_eq!(size % 256, 0);

    let lighting = SceneLighting::default();
    let expected = PerSceneConstants::new(
        lighting.ambient_colour,
        lighting.light_direction,
        lighting.light_colour,
    );
    let bytes = probe.buffer_contents(buffer).unwrap();
    assert_eq!(bytes, bytemuck::bytes_of(&expected));
}

fn triplanar_scene() -> Scene {
    let mut scene = Scene::new();
    scene
        .add(SceneObject::primitive("box", PrimitiveType::Cube))
        .unwrap();
    scene
        .add(
            SceneObject::primitive("rock", PrimitiveType::Sphere)
                .with_pipeline(RenderPipeline::Triplanar),
        )
        .unwrap();
    scene
}

fn without_triplanar() -> HeadlessConfig {
    HeadlessConfig {
        failing_pipelines: vec![("triplanar".to_string(), SampleCount::X1)],
        ..quiet()
    }
}

#[test]
fn test_missing_pipeline_lenient_draws_with_previous() {
    let (mut renderer, probe) = start(without_triplanar(), RendererConfig::default());
    let items = draw_items(&renderer, &triplanar_scene());

    assert_eq!(run_frame(&mut renderer, &items), PresentStatus::Presented);
    let (_, commands) = probe.submissions().pop().unwrap();
    let draws = commands
        .iter()
        .filter(|c| matches!(c, Command::Draw { .. }))
        .count();
    assert_eq!(draws, 2);
    assert_clean(&probe);
}

#[test]
fn test_missing_pipeline_strict_reports_after_submit() {
    let config = RendererConfig {
        failure_policy: FailurePolicy::Strict,
        ..Default::default()
    };
    let (mut renderer, probe) = start(without_triplanar(), config);
    let items = draw_items(&renderer, &triplanar_scene());

    renderer.begin_frame().unwrap();
    renderer.submit_draw_list(&items).unwrap();
    let err = renderer.end_frame(true).unwrap_err();

    assert!(matches!(
        err,
        RendererError::MissingPipeline {
            technique: RenderPipeline::Triplanar,
            samples: SampleCount::X1
        }
    ));
    assert_eq!(probe.submissions().len(), 1);
    assert_eq!(probe.count(|e| matches!(e, HeadlessEvent::Present { .. })), 1);
    assert_eq!(renderer.slot_state(0), SlotState::Submitted);
    assert_eq!(renderer.frame_slot(), 1);

    // The next frame starts normally.
    renderer.begin_frame().unwrap();
    renderer.end_frame(true).unwrap();
}

#[test]
#[should_panic(expected = "Triplanar")]
fn test_missing_pipeline_trap_panics() {
    let config = RendererConfig {
        failure_policy: FailurePolicy::Trap,
        ..Default::default()
    };
    let (mut renderer, _probe) = start(without_triplanar(), config);
    let items = draw_items(&renderer, &triplanar_scene());

    renderer.begin_frame().unwrap();
    let _ = renderer.submit_draw_list(&items);
}

#[test]
fn test_draws_skipped_without_any_pipeline() {
    let headless = HeadlessConfig {
        failing_pipelines: vec![("default".to_string(), SampleCount::X4)],
        ..quiet()
    };
    let (mut renderer, probe) = start(headless, RendererConfig::default());
    let items = draw_items(&renderer, &demo_scene());
    renderer.set_msaa(true, 4).unwrap();

    assert_eq!(run_frame(&mut renderer, &items), PresentStatus::Presented);

    // The box comes before any pipeline is bound and is skipped; the sky
    // reuses the height-field pipeline bound just before it.
    let (_, commands) = probe.submissions().pop().unwrap();
    let draws = commands
        .iter()
        .filter(|c| matches!(c, Command::Draw { .. }))
        .count();
    assert_eq!(draws, 2);
    assert!(matches!(commands[0], Command::BindDescriptorTable { slot: 0 }));
    assert_clean(&probe);
}

#[test]
fn test_shutdown_releases_owned_images() {
    let (mut renderer, probe) = start(quiet(), RendererConfig::default());
    let items = draw_items(&renderer, &demo_scene());
    renderer.set_msaa(true, 2).unwrap();
    run_frame(&mut renderer, &items);

    renderer.shutdown().unwrap();
    assert!(probe.live_images().iter().all(|(_, image)| image.backbuffer));
    assert!(renderer.shutdown().is_ok());
    assert_clean(&probe);
}
