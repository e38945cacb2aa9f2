// 该文件是 Shouyu （手语） 项目的一部分。
// tests/server.rs - HTTP 接口测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::{
  extract::{Query, State},
  http::{StatusCode, header},
  response::IntoResponse,
};
use futures::StreamExt;
use image::RgbImage;
use url::Url;

use shouyu::{
  FromUrl,
  detector::DetectorBuilder,
  hold::CommitUnit,
  input::CaptureOpener,
  model::{Centroid, CentroidModel, ClassifyError, GestureClassifier},
  output::draw::Overlay,
  server::{self, AppState, ServerError, StreamSettings, TextResponse, VideoFeedQuery},
  text::TextBuffer,
};

struct Fixture {
  state: AppState,
  frames: PathBuf,
  _dir: tempfile::TempDir,
}

fn classifier(n_features: usize) -> GestureClassifier {
  let model = CentroidModel::new(
    n_features,
    vec![Centroid {
      label: "A".to_string(),
      center: vec![0.0; n_features],
    }],
  )
  .unwrap();
  GestureClassifier::new(model)
}

fn write_frames(dir: &Path, count: usize) {
  for i in 0..count {
    RgbImage::from_pixel(16, 12, image::Rgb([(i * 40 % 256) as u8, 80, 160]))
      .save(dir.join(format!("{:03}.png", i)))
      .unwrap();
  }
}

/// 两个关键点的回放检测器与对应的四维模型
fn fixture(frames: usize, model_features: usize) -> Fixture {
  let dir = tempfile::tempdir().unwrap();
  let frames_dir = dir.path().join("frames");
  std::fs::create_dir(&frames_dir).unwrap();
  write_frames(&frames_dir, frames);

  let replay = dir.path().join("landmarks.jsonl");
  let line = r#"{"hands":[{"score":0.9,"landmarks":[{"x":0.2,"y":0.2},{"x":0.2,"y":0.2}]}]}"#;
  std::fs::write(&replay, vec![line; frames].join("\n")).unwrap();

  let detector =
    Url::parse(&format!("replay://{}?landmarks=2&loop", replay.display())).unwrap();
  let capture = Url::parse(&format!("image://{}", frames_dir.display())).unwrap();

  let state = AppState {
    text: Arc::new(TextBuffer::new()),
    classifier: Arc::new(classifier(model_features)),
    detector: Arc::new(DetectorBuilder::from_url(&detector).unwrap()),
    capture: Arc::new(CaptureOpener::from_url(&capture).unwrap()),
    overlay: Arc::new(Overlay::default()),
    settings: StreamSettings::default(),
    active_streams: Default::default(),
  };
  Fixture {
    state,
    frames: frames_dir,
    _dir: dir,
  }
}

#[tokio::test]
async fn health_reports_ok() {
  let fixture = fixture(1, 4);
  let body = server::health(State(fixture.state)).await;
  assert_eq!(body.0, serde_json::json!({ "status": "ok", "streams": 0 }));
}

#[tokio::test]
async fn text_endpoints_edit_the_shared_buffer() {
  let fixture = fixture(1, 4);
  let state = fixture.state.clone();
  state.text.commit(&CommitUnit::from_label("H"));
  state.text.commit(&CommitUnit::from_label("I"));

  let text = server::get_text(State(state.clone())).await;
  assert_eq!(text.0, TextResponse { text: "HI".to_string() });

  let text = server::backspace(State(state.clone())).await;
  assert_eq!(text.0.text, "H");

  let text = server::clear_text(State(state.clone())).await;
  assert_eq!(text.0.text, "");

  // 空缓冲区上再次退格与清空都不报错
  let text = server::backspace(State(state.clone())).await;
  assert_eq!(text.0.text, "");
  let text = server::clear_text(State(state)).await;
  assert_eq!(text.0.text, "");
}

#[tokio::test]
async fn video_feed_streams_one_part_per_frame() {
  let fixture = fixture(3, 4);
  let response = server::video_feed(
    State(fixture.state.clone()),
    Query(VideoFeedQuery::default()),
  )
  .await
  .unwrap();

  assert_eq!(response.status(), StatusCode::OK);
  assert_eq!(
    response.headers()[header::CONTENT_TYPE],
    "multipart/x-mixed-replace; boundary=frame"
  );

  let body = axum::body::to_bytes(response.into_body(), usize::MAX)
    .await
    .unwrap();
  let boundary = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
  let parts = body
    .windows(boundary.len())
    .filter(|window| *window == boundary.as_slice())
    .count();
  assert_eq!(parts, 3);
  assert!(body.ends_with(b"\r\n"));
  // 三帧不足以完成一次保持
  assert_eq!(fixture.state.text.read(), "");
}

#[tokio::test]
async fn dimension_mismatch_aborts_stream_startup() {
  let fixture = fixture(3, 42);
  let result = server::video_feed(
    State(fixture.state.clone()),
    Query(VideoFeedQuery { camera: 0 }),
  )
  .await;

  let err = match result {
    Err(err) => err,
    Ok(_) => panic!("维度不一致时不应返回视频流"),
  };
  assert!(matches!(
    err,
    ServerError::Classify(ClassifyError::DimensionMismatch {
      expected: 42,
      actual: 4
    })
  ));
  assert_eq!(
    err.into_response().status(),
    StatusCode::INTERNAL_SERVER_ERROR
  );

  // 文本接口不受影响
  let text = server::get_text(State(fixture.state)).await;
  assert_eq!(text.0.text, "");
}

#[tokio::test]
async fn missing_capture_source_is_unavailable() {
  let mut fixture = fixture(1, 4);
  let capture = Url::parse("image:///nonexistent/shouyu/frames").unwrap();
  fixture.state.capture = Arc::new(CaptureOpener::from_url(&capture).unwrap());

  let result = server::video_feed(State(fixture.state), Query(VideoFeedQuery::default())).await;
  let response = match result {
    Err(err) => err.into_response(),
    Ok(_) => panic!("采集源不存在时不应返回视频流"),
  };
  assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

/// 等待帧循环线程退出
async fn wait_for_streams(state: &AppState, expected: usize) -> bool {
  for _ in 0..40 {
    if state.active_streams() == expected {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
  }
  false
}

#[tokio::test]
async fn closing_video_feed_stops_the_frame_loop() {
  // 100 帧按 20fps 播放需要 5 秒，远长于等待时间
  let mut fixture = fixture(100, 4);
  let capture = Url::parse(&format!("image://{}?fps=20", fixture.frames.display())).unwrap();
  fixture.state.capture = Arc::new(CaptureOpener::from_url(&capture).unwrap());

  let response = server::video_feed(
    State(fixture.state.clone()),
    Query(VideoFeedQuery::default()),
  )
  .await
  .unwrap();
  assert_eq!(fixture.state.active_streams(), 1);

  let mut body = response.into_body().into_data_stream();
  let first = body.next().await.unwrap().unwrap();
  assert!(first.starts_with(b"--frame\r\n"));
  assert_eq!(fixture.state.active_streams(), 1);

  drop(body);
  assert!(wait_for_streams(&fixture.state, 0).await);

  let health = server::health(State(fixture.state)).await;
  assert_eq!(health.0["streams"], 0);
}

#[tokio::test]
async fn failed_startup_leaves_no_stream_running() {
  let fixture = fixture(3, 42);
  let result = server::video_feed(
    State(fixture.state.clone()),
    Query(VideoFeedQuery::default()),
  )
  .await;
  assert!(result.is_err());
  assert!(wait_for_streams(&fixture.state, 0).await);
}
