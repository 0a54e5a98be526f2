#![allow(non_snake_case)]
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use imm_ekf::state_estimator::models::dynamic::{Odometry, OdometryDelta, OdometryNoise, CT, CV};
use imm_ekf::state_estimator::models::measurement::{CartesianPosition, RangeBearing};
use imm_ekf::state_estimator::models::memoize::Memoized;
use imm_ekf::{
    DynamicModel, FixedTransition, GaussParams, ImmState, Measurement, StateEstimator, Tolerances,
    EKF, IMM,
};
use nalgebra::{DMatrix, DVector, Vector2};

type Motion = Box<dyn DynamicModel<Control = ()>>;

fn criterion_benchmark(c: &mut Criterion) {
    let Ts = 2.5;
    let sigma_z: f64 = 2.84;
    let sigma_a_cv = 0.14;
    let sigma_a_ct = 0.04;
    let sigma_w = 0.01;

    let PI = DMatrix::from_row_slice(2, 2, &[
        0.92, 0.08,
        0.1, 0.9
    ]);

    let cv: Motion = Box::new(Memoized::new(CV::with_dim(sigma_a_cv, 5)));
    let ct: Motion = Box::new(CT::new(sigma_a_ct, sigma_w));
    let ekf_cv = EKF::init(cv, CartesianPosition::new(5)).unwrap();
    let ekf_ct = EKF::init(ct, CartesianPosition::new(5)).unwrap();

    let transition = FixedTransition::new(PI, &Tolerances::default()).unwrap();
    let mut imm_filter = IMM::init(vec![ekf_cv, ekf_ct], transition).unwrap();

    let x0 = DVector::from_row_slice(&[
        2.47, 24.7,   0.,   0., 0.
    ]);

    let P0 = DMatrix::from_diagonal(&DVector::from_row_slice(&[
        sigma_z * sigma_z, sigma_z * sigma_z, 5.6 * 5.6, 5.6 * 5.6, 0.1 * 0.1,
    ]));

    let init = GaussParams::new(x0, P0);
    let immstate_upd = ImmState::new(vec![0.9, 0.1], vec![init.clone(), init]);
    let z = Measurement::isotropic(DVector::from_row_slice(&[4.1, 26.3]), sigma_z);

    c.bench_with_input(BenchmarkId::new("imm predict", 2), &immstate_upd, |b, immstate_upd| {
        b.iter(|| {
            let mut immstate = immstate_upd.clone();
            imm_filter.predict(&mut immstate, None, black_box(Ts)).unwrap();
            immstate
        })
    });

    let mut immstate_pred = immstate_upd.clone();
    imm_filter.predict(&mut immstate_pred, None, Ts).unwrap();

    c.bench_with_input(BenchmarkId::new("imm update", 2), &immstate_pred, |b, immstate_pred| {
        b.iter(|| {
            let mut immstate = immstate_pred.clone();
            imm_filter.update(black_box(&z), &mut immstate).unwrap();
            immstate
        })
    });

    let mut ekf = EKF::init(
        Odometry::new(OdometryNoise::default()),
        RangeBearing::new(3, Vector2::new(10.0, 5.0)),
    )
    .unwrap();
    let pose = GaussParams::new(DVector::from_row_slice(&[0., 0., 0.1]), DMatrix::identity(3, 3) * 0.1);
    let u = OdometryDelta {
        translation: 0.5,
        rotation: 0.05,
    };
    let z_rb = Measurement::new(
        DVector::from_row_slice(&[10.8, 0.35]),
        DMatrix::from_diagonal(&DVector::from_row_slice(&[0.04, 0.001])),
    );

    c.bench_function("ekf step", |b| {
        b.iter(|| {
            let mut state = pose.clone();
            ekf.step(black_box(&z_rb), &mut state, Some(&u), 0.1).unwrap();
            state
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
