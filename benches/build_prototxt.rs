use caffe_import::config::RawLayerConfig;
use caffe_import::net::{build_net_spec, AdjacencyMatrix, InitOptions, Net};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

/// A VGG-like stack of `blocks` conv/bn/scale/relu blocks.
fn deep_net(blocks: usize) -> (Vec<RawLayerConfig>, AdjacencyMatrix) {
    let mut layers = vec![json!({"name": "data", "type": "Data", "input_shape": [1, 3, 32, 32]})];
    for i in 0..blocks {
        layers.push(json!({"name": format!("conv{}", i), "type": "Convolution", "num_output": 16,
                           "kW": 3, "kH": 3, "dW": 1, "dH": 1, "pW": 1, "pH": 1}));
        layers.push(json!({"name": format!("bn{}", i), "type": "BatchNorm"}));
        layers.push(json!({"name": format!("scale{}", i), "type": "Scale"}));
        layers.push(json!({"name": format!("relu{}", i), "type": "ReLU"}));
    }
    let n = layers.len();
    let configs = serde_json::from_value(json!(layers)).unwrap();
    let edges: Vec<(usize, usize)> = (0..n - 1).map(|i| (i, i + 1)).collect();
    (configs, AdjacencyMatrix::from_edges(n, &edges).unwrap())
}

fn bench_build(c: &mut Criterion) {
    let (configs, graph) = deep_net(50);

    c.bench_function("build_net_spec 200 layers", |b| {
        b.iter(|| build_net_spec("bench", black_box(&configs), black_box(&graph)).unwrap())
    });

    c.bench_function("to_prototxt 200 layers", |b| {
        let spec = build_net_spec("bench", &configs, &graph).unwrap();
        b.iter(|| black_box(&spec).to_prototxt())
    });

    c.bench_function("instantiate and encode 200 layers", |b| {
        b.iter(|| {
            let spec = build_net_spec("bench", &configs, &graph).unwrap();
            let net = Net::from_spec(spec, &InitOptions::default()).unwrap();
            net.to_message().encode()
        })
    });
}

criterion_group!(benches, bench_build);
criterion_main!(benches);
