// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Black-box lifecycle tests driving `ConnectionManager` through the
//! `Producer`/`Consumer` facades against `FakeConnector`, with no real
//! broker involved.

use std::sync::Arc;

use mq_connection_manager::connector::fake::FakeConnectorFactory;
use mq_connection_manager::{
    Acknowledgement, ConnectionManager, ConnectionParameters, Consumer, EndpointUri, Producer,
};

fn params() -> ConnectionParameters {
    ConnectionParameters {
        host: "mardirac3.in2p3.fr".to_string(),
        port: 61613,
        vhost: None,
        user: Some("guest".to_string()),
        password: Some("guest".to_string()),
        acknowledgement: Acknowledgement::Auto,
        queues: vec!["test1".to_string()],
        topics: vec![],
    }
}

fn manager() -> Arc<ConnectionManager> {
    Arc::new(ConnectionManager::new(
        Arc::new(FakeConnectorFactory::new()),
    ))
}

#[tokio::test]
async fn producer_put_reaches_subscribed_consumer() {
    let manager = manager();
    let uri = || EndpointUri::parse("mardirac3.in2p3.fr::Queue::test1").unwrap();

    let consumer = Consumer::open(Arc::clone(&manager), uri(), &params())
        .await
        .unwrap();
    let producer = Producer::open(Arc::clone(&manager), uri(), &params())
        .await
        .unwrap();

    producer.put(b"payload".to_vec()).await.unwrap();
    let message = consumer.get().await.unwrap().unwrap();
    assert_eq!(message.body, b"payload".to_vec());
    assert!(consumer.get().await.unwrap().is_none());

    producer.close().await.unwrap();
    consumer.close().await.unwrap();
    assert!(manager.get_all_messengers().await.is_empty());
}

#[tokio::test]
async fn two_destinations_share_one_connector_and_teardown_in_order() {
    let manager = manager();
    let test1 = || EndpointUri::parse("mardirac3.in2p3.fr::Queue::test1").unwrap();
    let test2 = || EndpointUri::parse("mardirac3.in2p3.fr::Queue::test2").unwrap();
    let test4 = || EndpointUri::parse("testdir.blabla.ch::Queue::test4").unwrap();

    let p1 = Producer::open(Arc::clone(&manager), test1(), &params())
        .await
        .unwrap();
    let p2 = Producer::open(Arc::clone(&manager), test2(), &params())
        .await
        .unwrap();
    let p3 = Producer::open(Arc::clone(&manager), test4(), &params())
        .await
        .unwrap();

    let mut connections = manager.connection_ids().await;
    connections.sort();
    assert_eq!(
        connections,
        vec![
            "mardirac3.in2p3.fr".to_string(),
            "testdir.blabla.ch".to_string()
        ]
    );

    let mut messengers = manager.get_all_messengers().await;
    messengers.sort();
    assert_eq!(
        messengers,
        vec![
            "mardirac3.in2p3.fr/queue/test1/producer1".to_string(),
            "mardirac3.in2p3.fr/queue/test2/producer1".to_string(),
            "testdir.blabla.ch/queue/test4/producer1".to_string(),
        ]
    );

    p1.close().await.unwrap();
    p2.close().await.unwrap();
    p3.close().await.unwrap();
    assert!(manager.get_all_messengers().await.is_empty());
    assert!(manager.connection_ids().await.is_empty());
}

#[tokio::test]
async fn consumer_sharing_and_cascading_disconnect() {
    let manager = manager();
    let test1 = || EndpointUri::parse("mardirac3.in2p3.fr::Queue::test1").unwrap();
    let test2 = || EndpointUri::parse("mardirac3.in2p3.fr::Queue::test2").unwrap();

    let c1 = Consumer::open(Arc::clone(&manager), test1(), &params())
        .await
        .unwrap();
    let c2 = Consumer::open(Arc::clone(&manager), test1(), &params())
        .await
        .unwrap();
    let p1 = Producer::open(Arc::clone(&manager), test1(), &params())
        .await
        .unwrap();
    let c3 = Consumer::open(Arc::clone(&manager), test2(), &params())
        .await
        .unwrap();

    c1.close().await.unwrap();
    c2.close().await.unwrap();
    p1.close().await.unwrap();

    assert_eq!(
        manager.get_all_messengers().await,
        vec!["mardirac3.in2p3.fr/queue/test2/consumer1".to_string()]
    );
    assert!(manager.get_connector("mardirac3.in2p3.fr").await.is_ok());

    c3.close().await.unwrap();
    assert!(manager.get_all_messengers().await.is_empty());
    assert!(manager.get_connector("mardirac3.in2p3.fr").await.is_err());
}

#[tokio::test]
async fn repeated_open_close_cycles_leave_registry_empty() {
    let manager = manager();
    let uri = || EndpointUri::parse("mardirac3.in2p3.fr::Queue::test1").unwrap();

    for _ in 0..20 {
        let producer = Producer::open(Arc::clone(&manager), uri(), &params())
            .await
            .unwrap();
        producer.put(b"tick".to_vec()).await.unwrap();
        producer.close().await.unwrap();
        assert!(manager.get_all_messengers().await.is_empty());
        assert!(manager.connection_ids().await.is_empty());
    }
}

#[tokio::test]
async fn second_close_on_a_consumer_fails_and_does_not_mutate_state() {
    let manager = manager();
    let uri = EndpointUri::parse("mardirac3.in2p3.fr::Queue::test1").unwrap();
    let consumer = Consumer::open(Arc::clone(&manager), uri, &params())
        .await
        .unwrap();

    consumer.close().await.unwrap();
    assert!(manager.get_all_messengers().await.is_empty());

    let err = consumer.close().await.unwrap_err();
    assert!(matches!(
        err,
        mq_connection_manager::Error::UnknownMessenger(_)
    ));
    assert!(manager.get_all_messengers().await.is_empty());
}

#[tokio::test]
async fn concurrent_start_connection_never_allocates_duplicate_ids() {
    let manager = manager();
    let mut handles = Vec::new();
    for _ in 0..16 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(async move {
            let uri = EndpointUri::parse("mardirac3.in2p3.fr::Queue::test1").unwrap();
            Producer::open(manager, uri, &params()).await.unwrap()
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().id().to_string());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(
        ids.len(),
        16,
        "every concurrent start_connection must allocate a distinct id"
    );
    assert_eq!(
        manager.connection_ids().await,
        vec!["mardirac3.in2p3.fr".to_string()]
    );
}
