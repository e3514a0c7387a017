use super::*;
use crate::config::ServiceConfig;
use crate::flags::ControlFlags;
use crate::sampler::SamplePoint;
use crate::service::ServiceContext;
use std::sync::Arc;

fn context(active: bool) -> Arc<ServiceContext> {
    let mut config = ServiceConfig::default();
    config.acquisition.start_active = active;
    config.http.ip = "127.0.0.1".to_string();
    config.http.port = 0;
    ServiceContext::new(config, vec![SamplePoint::new("point_1", 40, 30)])
}

#[test]
fn test_command_parsing() {
    assert_eq!("start".parse::<ControlCommand>(), Ok(ControlCommand::Start));
    assert_eq!(" stop\n".parse::<ControlCommand>(), Ok(ControlCommand::Stop));
    assert_eq!(
        "get_pointcloud".parse::<ControlCommand>(),
        Ok(ControlCommand::GetPointcloud)
    );
    assert!("START".parse::<ControlCommand>().is_err());
    assert!("reboot".parse::<ControlCommand>().is_err());

    assert_eq!(ControlCommand::from_payload(b"start\r\n"), Some(ControlCommand::Start));
    assert_eq!(ControlCommand::from_payload(&[0xff, 0xfe]), None);
    assert_eq!(ControlCommand::GetPointcloud.to_string(), "get_pointcloud");
}

#[test]
fn test_command_apply() {
    let flags = ControlFlags::new(false);

    ControlCommand::Start.apply(&flags, "test");
    assert!(flags.is_active());

    ControlCommand::GetPointcloud.apply(&flags, "test");
    assert!(flags.pointcloud_requested());
    assert!(flags.is_active());

    ControlCommand::Stop.apply(&flags, "test");
    assert!(!flags.is_active());
    assert!(flags.pointcloud_requested());
}

#[cfg(feature = "http")]
mod http_tests {
    use super::*;
    use crate::acquisition::{capture_channel, AcquisitionLoop};
    use crate::sensor::{MockSensor, SensorLinkBuilder};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tower::ServiceExt;

    async fn call(context: &Arc<ServiceContext>, method: &str, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = control_router(Arc::clone(context))
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(
            response.headers().get(header::CONNECTION).unwrap(),
            "close"
        );
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_status_route() {
        let context = context(false);
        context.flags.set_connection_retries(2);

        let (status, json) = call(&context, "GET", "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["active"], false);
        assert_eq!(json["connected"], false);
        assert_eq!(json["device_connected"], false);
        assert_eq!(json["retries"], 2);
    }

    #[tokio::test]
    async fn test_start_and_stop_routes() {
        let context = context(false);

        let (status, json) = call(&context, "POST", "/start").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({"status": "started"}));
        assert!(context.flags.is_active());

        let (_, json) = call(&context, "POST", "/stop").await;
        assert_eq!(json, serde_json::json!({"status": "stopped"}));
        assert!(!context.flags.is_active());
    }

    #[tokio::test]
    async fn test_unknown_routes() {
        let context = context(false);

        let (status, json) = call(&context, "GET", "/reboot").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({"error": "unknown command"}));

        // Wrong method on a known path
        let (status, json) = call(&context, "GET", "/start").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["error"], "unknown command");
        assert!(!context.flags.is_active());
    }

    #[tokio::test]
    async fn test_tcp_round_trip_closes_connection() {
        let context = context(false);
        let bound = ControlServer::new(Arc::clone(&context)).bind().await.unwrap();
        let addr = bound.local_addr();
        let server = tokio::spawn(bound.serve(context.shutdown.clone()));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"POST /start HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();

        let mut response = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
            .await
            .unwrap()
            .unwrap();
        let response = String::from_utf8_lossy(&response).to_lowercase();

        assert!(response.starts_with("http/1.1 200"));
        assert!(response.contains("connection: close"));
        assert!(response.contains(r#"{"status":"started"}"#));
        assert!(context.flags.is_active());

        context.shutdown.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bind_conflict_reported() {
        let context = context(false);
        let first = ControlServer::new(Arc::clone(&context)).bind().await.unwrap();

        let mut config = context.config.clone();
        config.http.port = first.local_addr().port();
        let clash = ServiceContext::new(config, context.points.clone());

        let err = ControlServer::new(clash).bind().await.err().unwrap();
        assert!(matches!(err, crate::error::ResourceError::BindFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_http_start_reaches_idle_acquisition() {
        let context = context(false);
        let (sensor, handle) = MockSensor::uniform(1000);
        let link = SensorLinkBuilder::new()
            .config(context.config.sensor.clone())
            .sensor(Box::new(sensor))
            .build()
            .unwrap();
        let (_requester, requests) = capture_channel(1);
        tokio::spawn(AcquisitionLoop::new(Arc::clone(&context), link, requests).run());

        // Deep idle
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(handle.capture_calls(), 0);

        let (_, json) = call(&context, "POST", "/start").await;
        assert_eq!(json["status"], "started");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.capture_calls() >= 1);
    }
}

#[cfg(feature = "mqtt")]
mod mqtt_tests {
    use super::*;
    use crate::config::MqttConfig;
    use crate::control::mqtt::handle_packet;
    use rumqttc::{AsyncClient, ConnAck, ConnectReturnCode, Packet, Publish, QoS};

    fn client(context: &ServiceContext) -> (AsyncClient, rumqttc::EventLoop) {
        AsyncClient::new(mqtt_options(&context.config.mqtt), 16)
    }

    #[test]
    fn test_client_id_defaults_to_unique() {
        let config = MqttConfig::default();
        let a = mqtt_options(&config);
        let b = mqtt_options(&config);
        assert!(a.client_id().starts_with("hps3d-service-"));
        assert_ne!(a.client_id(), b.client_id());

        let config = MqttConfig {
            client_id: Some("garage".to_string()),
            ..MqttConfig::default()
        };
        assert_eq!(mqtt_options(&config).client_id(), "garage");
    }

    #[tokio::test]
    async fn test_connack_marks_broker_connected() {
        let context = context(false);
        let (client, _eventloop) = client(&context);

        handle_packet(
            &context,
            &client,
            Packet::ConnAck(ConnAck::new(ConnectReturnCode::NotAuthorized, false)),
        );
        assert!(!context.flags.broker_connected());

        handle_packet(
            &context,
            &client,
            Packet::ConnAck(ConnAck::new(ConnectReturnCode::Success, false)),
        );
        assert!(context.flags.broker_connected());
        assert!(context.status().broker_connected);
    }

    #[tokio::test]
    async fn test_control_topic_commands() {
        let context = context(false);
        let (client, _eventloop) = client(&context);
        let topic = context.config.mqtt.control_topic.clone();

        handle_packet(
            &context,
            &client,
            Packet::Publish(Publish::new(&topic, QoS::AtMostOnce, "start")),
        );
        assert!(context.flags.is_active());

        handle_packet(
            &context,
            &client,
            Packet::Publish(Publish::new(&topic, QoS::AtMostOnce, "get_pointcloud")),
        );
        assert!(context.flags.pointcloud_requested());

        handle_packet(
            &context,
            &client,
            Packet::Publish(Publish::new(&topic, QoS::AtMostOnce, "explode")),
        );
        assert!(context.flags.is_active());

        // Same command on another topic is ignored
        handle_packet(
            &context,
            &client,
            Packet::Publish(Publish::new("elsewhere", QoS::AtMostOnce, "stop")),
        );
        assert!(context.flags.is_active());

        handle_packet(
            &context,
            &client,
            Packet::Publish(Publish::new(&topic, QoS::AtMostOnce, "stop")),
        );
        assert!(!context.flags.is_active());
    }
}
