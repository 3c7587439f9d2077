use mobilenet_core::{
    Error, HostBackend, MOBILENET_ARCHITECTURE, MobileNet, ParameterStore, Tensor, TensorShape,
    classify,
};

/// Small deterministic weights so activations stay finite across 61 layers.
fn store() -> ParameterStore {
    ParameterStore::from_fn(&MOBILENET_ARCHITECTURE, |layer, i| {
        let phase = (layer * 31 + i * 17) % 23;
        (phase as f32 - 11.0) * 0.01
    })
}

fn image(width: usize, height: usize, value: f32) -> Tensor {
    Tensor::from_fn(TensorShape::new(width, height, 3).unwrap(), |_, _, _| value)
}

#[test]
fn constant_image_yields_a_probability_distribution() {
    let store = store();
    let network = MobileNet::new(&store).expect("assemble network");
    let probs = classify(&HostBackend, &network, image(32, 32, 128.0)).expect("forward pass");

    assert_eq!(probs.len(), 2);
    assert!(probs.iter().all(|p| p.is_finite() && (0.0..=1.0).contains(p)));
    assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5, "{probs:?}");
}

#[test]
fn uniform_weights_split_probability_evenly() {
    let store = ParameterStore::filled(&MOBILENET_ARCHITECTURE, 0.001);
    let network = MobileNet::new(&store).unwrap();
    let probs = classify(&HostBackend, &network, image(40, 36, 255.0)).unwrap();
    assert!((probs[0] - 0.5).abs() < 1e-5, "{probs:?}");
    assert!((probs[1] - 0.5).abs() < 1e-5, "{probs:?}");
}

#[test]
fn rectangular_and_larger_images_are_supported() {
    let store = store();
    let network = MobileNet::new(&store).unwrap();
    for (width, height) in [(64, 48), (33, 97)] {
        let input = Tensor::from_fn(TensorShape::new(width, height, 3).unwrap(), |x, y, c| {
            ((x * 7 + y * 3 + c * 11) % 256) as f32
        });
        let probs = classify(&HostBackend, &network, input)
            .unwrap_or_else(|err| panic!("{width}x{height}: {err}"));
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }
}

#[test]
fn too_small_images_report_the_failing_layer() {
    let store = store();
    let network = MobileNet::new(&store).unwrap();
    let err = classify(&HostBackend, &network, image(6, 6, 1.0)).unwrap_err();
    match err {
        Error::UnsupportedConfiguration { layer, .. } => assert_eq!(layer, "DepthwiseConv2D"),
        other => panic!("unexpected error {other}"),
    }
}
