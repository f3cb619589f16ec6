// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agora_core::model::Invite;
use agora_core::{EncryptionKey, Hash, PrivateKey, PublicKey, Timestamp};
use assert_matches::assert_matches;
use async_trait::async_trait;
use tokio::sync::watch;

use crate::candidate::{Candidate, CandidateState};
use crate::error::PairingError;
use crate::invite::{CreatedInvite, InviteCode, create_invite};
use crate::member::{Admission, Member};
use crate::message::Confirmation;
use crate::pairer::{Bound, Pairer};
use crate::test_utils::setup_logging;
use crate::transport::{MemoryTransport, Transport};

const TIMEOUT: Duration = Duration::from_secs(30);

/// Log of the inviting side, admitting a candidate flips its writability.
#[derive(Clone)]
struct TestLog {
    key: Hash,
    discovery_key: Hash,
    encryption_key: EncryptionKey,
    invites: Arc<Mutex<HashMap<Hash, Invite>>>,
    writers: watch::Sender<Vec<PublicKey>>,
}

impl TestLog {
    fn new() -> Self {
        Self {
            key: Hash::new(b"log"),
            discovery_key: Hash::new(b"discovery"),
            encryption_key: EncryptionKey::random(),
            invites: Arc::default(),
            writers: watch::Sender::new(Vec::new()),
        }
    }

    fn invite(&self, max_uses: u32) -> CreatedInvite {
        let created = create_invite(self.discovery_key, Duration::from_secs(60)).unwrap();
        self.invites.lock().unwrap().insert(
            created.id,
            Invite {
                id: created.id,
                invite: created.invite.clone(),
                public_key: created.public_key,
                expires: created.expires,
                room_id: None,
                max_uses,
                use_count: 0,
                is_revoked: false,
            },
        );
        created
    }

    fn revoke(&self, id: &Hash) {
        let mut invites = self.invites.lock().unwrap();
        invites.get_mut(id).unwrap().is_revoked = true;
    }

    fn replica(&self, local_key: PublicKey) -> TestReplica {
        let mut writers = self.writers.subscribe();
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            if writers
                .wait_for(|writers| writers.contains(&local_key))
                .await
                .is_ok()
            {
                tx.send_replace(true);
            }
        });
        TestReplica {
            writable: rx,
            closed: Arc::default(),
        }
    }
}

#[async_trait]
impl Admission for TestLog {
    type Error = Infallible;

    async fn find_invite(&self, id: &Hash) -> Result<Option<Invite>, Self::Error> {
        Ok(self.invites.lock().unwrap().get(id).cloned())
    }

    async fn admit(
        &self,
        invite: &Invite,
        candidate: PublicKey,
    ) -> Result<Confirmation, Self::Error> {
        if let Some(stored) = self.invites.lock().unwrap().get_mut(&invite.id) {
            stored.use_count += 1;
        }
        self.writers.send_modify(|writers| writers.push(candidate));
        Ok(Confirmation {
            key: self.key,
            encryption_key: self.encryption_key,
        })
    }
}

#[derive(Debug)]
struct TestReplica {
    writable: watch::Receiver<bool>,
    closed: Arc<AtomicBool>,
}

impl Bound for TestReplica {
    fn writable(&self) -> watch::Receiver<bool> {
        self.writable.clone()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn pairer(
    transport: &MemoryTransport,
    log: &TestLog,
    code: &CreatedInvite,
    timeout: Duration,
) -> (Pairer<TestReplica>, PublicKey) {
    let user_data = PrivateKey::new().public_key();
    let invite: InviteCode = code.code().parse().unwrap();
    let candidate = Candidate::new(transport.clone(), invite, user_data);
    let log = log.clone();
    let pairer = Pairer::spawn(candidate, timeout, move |confirmation: Confirmation| async move {
        assert_eq!(confirmation.key, log.key);
        Ok::<_, Infallible>(log.replica(user_data))
    });
    (pairer, user_data)
}

#[tokio::test]
async fn candidate_becomes_writable() {
    setup_logging();

    let transport = MemoryTransport::new();
    let ant = TestLog::new();
    let member = Member::spawn(&transport, ant.discovery_key, ant.clone())
        .await
        .unwrap();
    let invite = ant.invite(0);

    // Scenario: bat redeems the invite created by ant.
    let (mut bat, bat_key) = pairer(&transport, &ant, &invite, TIMEOUT);
    let replica = bat.finished().await.unwrap();
    assert!(*replica.writable.borrow());
    assert_eq!(bat.state(), CandidateState::Writable);
    assert!(ant.writers.borrow().contains(&bat_key));

    // Unlimited invites can be redeemed again.
    let (mut cat, _) = pairer(&transport, &ant, &invite, TIMEOUT);
    assert!(cat.finished().await.is_ok());
    assert_eq!(ant.invites.lock().unwrap()[&invite.id].use_count, 2);

    member.close().await;
    assert_eq!(transport.listener_count(), 0);
}

#[tokio::test]
async fn request_before_member_listens() {
    let transport = MemoryTransport::new();
    let ant = TestLog::new();
    let invite = ant.invite(0);

    let (mut bat, _) = pairer(&transport, &ant, &invite, TIMEOUT);
    tokio::task::yield_now().await;

    let member = Member::spawn(&transport, ant.discovery_key, ant.clone())
        .await
        .unwrap();
    assert!(bat.finished().await.is_ok());
    member.close().await;
}

#[tokio::test]
async fn invalid_invites_are_rejected() {
    let transport = MemoryTransport::new();
    let ant = TestLog::new();
    let member = Member::spawn(&transport, ant.discovery_key, ant.clone())
        .await
        .unwrap();

    // Revoked.
    let revoked = ant.invite(0);
    ant.revoke(&revoked.id);
    let (mut bat, _) = pairer(&transport, &ant, &revoked, TIMEOUT);
    assert_matches!(bat.finished().await, Err(PairingError::Rejected));
    assert_eq!(bat.state(), CandidateState::Failed);

    // Used up after the first redemption.
    let single = ant.invite(1);
    let (mut bat, _) = pairer(&transport, &ant, &single, TIMEOUT);
    assert!(bat.finished().await.is_ok());
    let (mut cat, cat_key) = pairer(&transport, &ant, &single, TIMEOUT);
    assert_matches!(cat.finished().await, Err(PairingError::Rejected));
    assert!(!ant.writers.borrow().contains(&cat_key));

    // Never stored by ant.
    let unknown = create_invite(ant.discovery_key, Duration::from_secs(60)).unwrap();
    let (mut cat, _) = pairer(&transport, &ant, &unknown, TIMEOUT);
    assert_matches!(cat.finished().await, Err(PairingError::Rejected));

    // Expired.
    let expired = ant.invite(0);
    ant.invites.lock().unwrap().get_mut(&expired.id).unwrap().expires = Timestamp::new(1);
    let (mut cat, _) = pairer(&transport, &ant, &expired, TIMEOUT);
    assert_matches!(cat.finished().await, Err(PairingError::Rejected));

    member.close().await;
}

#[tokio::test(start_paused = true)]
async fn timeout_leaves_nothing_behind() {
    let transport = MemoryTransport::new();
    let ant = TestLog::new();
    let invite = ant.invite(0);

    // Scenario: nobody accepts bat's request.
    let (mut bat, _) = pairer(&transport, &ant, &invite, Duration::from_secs(1));
    assert_matches!(bat.finished().await, Err(PairingError::Timeout));
    assert_eq!(bat.state(), CandidateState::Failed);
    assert_eq!(transport.listener_count(), 0);
    assert_eq!(transport.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn replica_closed_when_never_writable() {
    let transport = MemoryTransport::new();
    let ant = TestLog::new();
    let invite = ant.invite(0);
    let member = Member::spawn(&transport, ant.discovery_key, ant.clone())
        .await
        .unwrap();

    // The replica handed out never sees its own admission.
    let closed = Arc::new(AtomicBool::new(false));
    let (_writable, never_writable) = watch::channel(false);
    let candidate = Candidate::new(
        transport.clone(),
        invite.code().parse().unwrap(),
        PrivateKey::new().public_key(),
    );
    let mut bat = Pairer::spawn(candidate, Duration::from_secs(5), {
        let closed = closed.clone();
        move |_confirmation: Confirmation| async move {
            Ok::<_, Infallible>(TestReplica {
                writable: never_writable,
                closed,
            })
        }
    });

    assert_matches!(bat.finished().await, Err(PairingError::Timeout));
    assert!(closed.load(Ordering::SeqCst));
    member.close().await;
}

#[tokio::test]
async fn closing_rejects_unfinished_pairing() {
    let transport = MemoryTransport::new();
    let ant = TestLog::new();
    let invite = ant.invite(0);

    let (mut bat, _) = pairer(&transport, &ant, &invite, TIMEOUT);
    bat.close();
    assert_matches!(bat.finished().await, Err(PairingError::Closed));
    assert_matches!(bat.finished().await, Err(PairingError::Closed));
    assert_eq!(transport.pending_count(), 0);

    // The topic is free for other requests.
    let listener = transport.listen(ant.discovery_key).await.unwrap();
    drop(listener);
}
