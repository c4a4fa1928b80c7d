use motion_sensorhub::{
    CoordinatorConfig, HubError, Reading, SensorEvent, SensorHub, SensorKind, SensorStream,
    SessionState,
};
use std::time::Duration;
use tokio_stream::StreamExt;

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

async fn next_reading(stream: &mut SensorStream) -> Reading {
    let event = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("timed out")
        .expect("stream closed");
    match event {
        SensorEvent::Reading(reading) => reading,
        other => panic!("expected reading, got {:?}", other),
    }
}

fn norm(reading: &Reading) -> f64 {
    let [x, y, z] = reading.value.as_vector().expect("vector reading");
    (x * x + y * y + z * z).sqrt()
}

#[tokio::test(start_paused = true)]
async fn shared_motion_streams_follow_fastest_consumer() {
    let hub = SensorHub::simulated(CoordinatorConfig::default());

    let (a, mut gravity) = hub.subscribe_stream(SensorKind::Gravity, ms(200)).await.unwrap();
    assert_eq!(hub.motion().session().await.period(), Some(ms(200)));

    let (b, mut user) = hub
        .subscribe_stream(SensorKind::UserAcceleration, ms(100))
        .await
        .unwrap();
    assert_eq!(hub.motion().session().await.period(), Some(ms(100)));

    // Gravity now arrives at the faster shared period
    let mut readings = Vec::new();
    for _ in 0..3 {
        readings.push(next_reading(&mut gravity).await);
    }
    assert!(readings.iter().all(|r| r.kind == SensorKind::Gravity));
    assert_eq!(readings[2].timestamp_ns - readings[1].timestamp_ns, 100_000_000);
    assert!((norm(&readings[2]) - 9.8).abs() < 1e-9);

    for _ in 0..3 {
        assert_eq!(next_reading(&mut user).await.kind, SensorKind::UserAcceleration);
    }

    hub.unsubscribe(a).await;
    assert_eq!(hub.motion().session().await.period(), Some(ms(100)));

    hub.unsubscribe(b).await;
    assert_eq!(hub.motion().session().await, SessionState::Idle);

    let status = hub.status().await;
    assert_eq!(status.motion.consumers, 0);
    assert_eq!(status.motion.stats.starts, 2);
    assert_eq!(status.motion.stats.restarts, 1);
}

#[tokio::test(start_paused = true)]
async fn direct_sensors_run_independently() {
    let hub = SensorHub::simulated(CoordinatorConfig::default());

    let (baro_id, mut baro) = hub.subscribe_stream(SensorKind::Barometer, ms(1000)).await.unwrap();
    let (_, mut gyro) = hub.subscribe_stream(SensorKind::Gyroscope, ms(20)).await.unwrap();

    let pressure = next_reading(&mut baro).await;
    assert_eq!(pressure.kind, SensorKind::Barometer);
    let hpa = pressure.value.as_scalar().expect("scalar pressure");
    assert!((hpa - 1013.25).abs() < 0.01);

    let first = next_reading(&mut gyro).await;
    let second = next_reading(&mut gyro).await;
    assert_eq!(second.timestamp_ns - first.timestamp_ns, 20_000_000);

    // Direct sensors take one subscriber and never touch the shared session
    let err = hub.subscribe_stream(SensorKind::Barometer, ms(500)).await.unwrap_err();
    assert!(matches!(err, HubError::SensorBusy { .. }));
    assert_eq!(hub.motion().session().await, SessionState::Idle);

    hub.unsubscribe(baro_id).await;
    assert!(hub.subscribe_stream(SensorKind::Barometer, ms(500)).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn shutdown_ends_every_stream() {
    let hub = SensorHub::simulated(CoordinatorConfig::default());
    let (_, mut gravity) = hub.subscribe_stream(SensorKind::Gravity, ms(100)).await.unwrap();
    let (_, mut mag) = hub.subscribe_stream(SensorKind::Magnetometer, ms(100)).await.unwrap();

    next_reading(&mut gravity).await;
    next_reading(&mut mag).await;

    hub.shutdown().await;
    while gravity.next().await.is_some() {}
    while mag.next().await.is_some() {}

    let status = hub.status().await;
    assert!(!status.motion.session.is_running());
    assert!(status.direct.iter().all(|d| !d.is_running && d.subscriber.is_none()));
}
