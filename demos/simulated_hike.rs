//! Simulated hike through the recorder actor: start, walk, pause, resume, stop.
//!
//! Run with: cargo run --example simulated_hike

use std::sync::Arc;
use std::time::Duration;

use trail_recorder::{
    spawn_recorder, ExportProperties, FixSample, LocationHub, LocationSource, ManualLocationSource,
    RecorderHandle, RouteSession, SharedConfig,
};

/// A fix `north_m` meters north of the trailhead, climbing 1m per 10m walked.
fn fix(north_m: f64, accuracy: f64, t_s: i64) -> FixSample {
    let trailhead = (46.5580, 7.9800); // Wengen
    FixSample::new(
        trailhead.0 + north_m / 111_195.0,
        trailhead.1,
        1274.0 + north_m / 10.0,
        accuracy,
        3.0,
        1_700_000_000_000 + t_s * 1_000,
    )
}

async fn walk(recorder: &RecorderHandle, from_m: f64, to_m: f64, t0: i64) {
    let mut north = from_m;
    let mut t = t0;
    while north <= to_m {
        // Every fifth fix is a poor one, as under trees.
        let accuracy = if t % 5 == 0 { 25.0 } else { 4.0 };
        if let Err(err) = recorder.publish_fix(fix(north, accuracy, t)) {
            println!("   rejected fix: {}", err);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        north += 3.0;
        t += 1;
    }
}

#[tokio::main]
async fn main() -> trail_recorder::Result<()> {
    let hub = Arc::new(LocationHub::new());
    let source = Arc::new(ManualLocationSource::authorized());
    let session = RouteSession::new(hub, source.clone(), SharedConfig::default());
    let (recorder, task) = spawn_recorder(session);

    println!("Simulated Hike\n");

    recorder.start().await?;
    println!("1. Started, sampling {:?}", source.sampling());

    walk(&recorder, 0.0, 300.0, 0).await;
    println!("2. Walked 300m: {} points", recorder.status().point_count);

    recorder.pause().await?;
    println!("3. Paused: {} segments", recorder.status().segment_count);

    recorder.resume().await?;
    walk(&recorder, 320.0, 600.0, 200).await;

    recorder.stop().await?;
    let status = recorder.status();
    println!(
        "4. Stopped: {} segments, {} points, {} coordinates logged",
        status.segment_count, status.point_count, status.coordinate_count
    );

    let metrics = recorder.distance_and_ascent().await?;
    println!(
        "\nDistance: {:.0}m, ascent: {:.0}m",
        metrics.total_distance_meters, metrics.total_ascent_meters
    );

    let geometry = recorder
        .export_segments(ExportProperties {
            name: "Wengen walk".into(),
            color: Some("#d94f00".into()),
            ..Default::default()
        })
        .await?;
    println!("BBox: {:?}", geometry.bbox());

    if let Some(record) = recorder.create_route("Wengen walk").await? {
        println!("Route JSON: {} bytes", record.to_json()?.len());
    }

    drop(recorder);
    let _ = task.await;
    Ok(())
}
