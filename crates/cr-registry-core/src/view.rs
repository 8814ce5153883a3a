use cr_api_types::{ConnectionState, FormUpdateRequest, Student, ViewSnapshot};
use cr_chain_client::WalletProvider;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{Bootstrapper, Gateway, MutationOutcome, RegistryError};

pub const REGISTERED_MESSAGE: &str = "Student registered successfully!";
pub const REMOVED_MESSAGE: &str = "Student removed successfully!";

/// The snapshot lock is never held across a chain call, so overlapping
/// submissions send separate transactions and the last refetch to settle wins,
/// even when it predates the other confirmed write.
pub struct ViewController {
    bootstrapper: Bootstrapper,
    confirmations: u64,
    snapshot: RwLock<ViewSnapshot>,
}

impl ViewController {
    pub fn new(bootstrapper: Bootstrapper, confirmations: u64) -> Self {
        Self {
            bootstrapper,
            confirmations,
            snapshot: RwLock::new(ViewSnapshot::default()),
        }
    }

    pub fn bootstrapper(&self) -> &Bootstrapper {
        &self.bootstrapper
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.bootstrapper.state().await
    }

    pub async fn snapshot(&self) -> ViewSnapshot {
        self.snapshot.read().await.clone()
    }

    pub async fn mount(&self, wallet: Option<&dyn WalletProvider>) -> ConnectionState {
        if let Ok(registry) = self.bootstrapper.bootstrap(wallet).await {
            let gateway = Gateway::new(registry, self.confirmations);
            if let Some(students) = gateway.fetch_all().await {
                self.replace_students(students).await;
            }
        }
        self.bootstrapper.state().await
    }

    pub async fn edit_form(&self, update: FormUpdateRequest) -> ViewSnapshot {
        self.replace(|current| {
            let mut next = current.clone();
            if let Some(student_id) = update.student_id {
                next.form.student_id = student_id;
            }
            if let Some(student_name) = update.student_name {
                next.form.student_name = student_name;
            }
            next
        })
        .await
    }

    // The form is left as typed.
    pub async fn submit_registration(&self) -> ViewSnapshot {
        let form = self.snapshot.read().await.form.clone();
        debug!("submitting registration for id {:?}", form.student_id);

        let result = match self.gateway() {
            Ok(gateway) => gateway.register(&form.student_id, &form.student_name).await,
            Err(err) => Err(err),
        };

        self.settle(result, REGISTERED_MESSAGE, "Error registering student")
            .await
    }

    pub async fn submit_removal(&self, id: u64) -> ViewSnapshot {
        debug!("submitting removal for id {}", id);

        let result = match self.gateway() {
            Ok(gateway) => gateway.remove(id).await,
            Err(err) => Err(err),
        };

        self.settle(result, REMOVED_MESSAGE, "Error removing student").await
    }

    fn gateway(&self) -> Result<Gateway, RegistryError> {
        self.bootstrapper
            .registry()
            .map(|registry| Gateway::new(registry, self.confirmations))
            .ok_or(RegistryError::NotConnected)
    }

    async fn settle(
        &self,
        result: Result<MutationOutcome, RegistryError>,
        success: &str,
        failure_prefix: &str,
    ) -> ViewSnapshot {
        match result {
            Ok(outcome) => {
                self.replace(|current| ViewSnapshot {
                    students: outcome.students.unwrap_or_else(|| current.students.clone()),
                    message: success.to_owned(),
                    form: current.form.clone(),
                })
                .await
            }
            Err(err) => {
                warn!("{}: {}", failure_prefix, err);
                self.replace(|current| ViewSnapshot {
                    message: format!("{failure_prefix}: {err}"),
                    ..current.clone()
                })
                .await
            }
        }
    }

    async fn replace_students(&self, students: Vec<Student>) {
        self.replace(|current| ViewSnapshot {
            students,
            ..current.clone()
        })
        .await;
    }

    async fn replace<F>(&self, next: F) -> ViewSnapshot
    where
        F: FnOnce(&ViewSnapshot) -> ViewSnapshot,
    {
        let mut guard = self.snapshot.write().await;
        let replacement = next(&*guard);
        *guard = replacement;
        guard.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use cr_api_types::{ContractAddress, RegistrationForm, WalletAddress};
    use cr_chain_client::{
        InMemoryRegistry, InMemoryWallet, RegistryContract, StudentRecord, SubmittedTx, TxReceiptResult,
    };
    use std::sync::Arc;
    use tokio::sync::Barrier;

    /// Holds every confirmation until the barrier fills up.
    struct GatedRegistry {
        inner: Arc<InMemoryRegistry>,
        confirmations: Barrier,
    }

    #[async_trait]
    impl RegistryContract for GatedRegistry {
        fn address(&self) -> &ContractAddress {
            self.inner.address()
        }

        fn signer_address(&self) -> &WalletAddress {
            self.inner.signer_address()
        }

        async fn get_all_students(&self) -> Result<Vec<StudentRecord>> {
            self.inner.get_all_students().await
        }

        async fn register_student(&self, id: u64, name: &str) -> Result<SubmittedTx> {
            self.inner.register_student(id, name).await
        }

        async fn remove_student(&self, id: u64) -> Result<SubmittedTx> {
            self.inner.remove_student(id).await
        }

        async fn wait_for_confirmation(&self, tx: &SubmittedTx, confirmations: u64) -> Result<TxReceiptResult> {
            self.confirmations.wait().await;
            self.inner.wait_for_confirmation(tx, confirmations).await
        }
    }

    struct GatedWallet(Arc<GatedRegistry>);

    #[async_trait]
    impl WalletProvider for GatedWallet {
        async fn request_accounts(&self) -> Result<Vec<WalletAddress>> {
            Ok(vec![self.0.signer_address().clone()])
        }

        async fn bind_registry(
            &self,
            _account: &WalletAddress,
            _address: &ContractAddress,
        ) -> Result<Arc<dyn RegistryContract>> {
            let registry: Arc<dyn RegistryContract> = self.0.clone();
            Ok(registry)
        }
    }

    async fn mounted() -> (Arc<InMemoryRegistry>, ViewController) {
        let registry = Arc::new(InMemoryRegistry::default());
        let controller = ViewController::new(Bootstrapper::new(registry.address().clone()), 1);
        let wallet = InMemoryWallet::new(registry.clone());
        controller.mount(Some(&wallet)).await;
        (registry, controller)
    }

    async fn fill_form(controller: &ViewController, id: &str, name: &str) {
        controller
            .edit_form(FormUpdateRequest {
                student_id: Some(id.to_owned()),
                student_name: Some(name.to_owned()),
            })
            .await;
    }

    fn ada() -> Student {
        Student {
            id: 7,
            name: "Ada".to_owned(),
        }
    }

    #[tokio::test]
    async fn absent_wallet_leaves_view_empty() {
        let controller = ViewController::new(
            Bootstrapper::new(InMemoryRegistry::default().address().clone()),
            1,
        );

        let state = controller.mount(None).await;

        assert_eq!(state, ConnectionState::Disconnected);
        assert_eq!(controller.snapshot().await, ViewSnapshot::default());
    }

    #[tokio::test]
    async fn mutation_before_ready_reports_not_initialized() {
        let controller = ViewController::new(
            Bootstrapper::new(InMemoryRegistry::default().address().clone()),
            1,
        );
        controller.mount(None).await;
        fill_form(&controller, "7", "Ada").await;

        let view = controller.submit_registration().await;

        assert_eq!(view.message, "Error registering student: Contract not initialized");
        assert!(view.students.is_empty());
    }

    #[tokio::test]
    async fn failed_initial_fetch_still_reaches_ready() {
        let registry = Arc::new(InMemoryRegistry::default());
        registry.insert(1, "Grace").await;
        registry.set_fail_reads(true);
        let controller = ViewController::new(Bootstrapper::new(registry.address().clone()), 1);
        let wallet = InMemoryWallet::new(registry.clone());

        let state = controller.mount(Some(&wallet)).await;

        assert_eq!(state, ConnectionState::Ready);
        assert!(controller.snapshot().await.students.is_empty());
        assert_eq!(registry.read_calls(), 1);
    }

    #[tokio::test]
    async fn mount_loads_existing_students() {
        let registry = Arc::new(InMemoryRegistry::default());
        registry.insert(1, "Grace").await;
        let controller = ViewController::new(Bootstrapper::new(registry.address().clone()), 1);
        let wallet = InMemoryWallet::new(registry.clone());

        let state = controller.mount(Some(&wallet)).await;

        assert_eq!(state, ConnectionState::Ready);
        assert_eq!(controller.snapshot().await.students.len(), 1);
        assert_eq!(registry.read_calls(), 1);
    }

    #[tokio::test]
    async fn register_then_remove_round_trip() {
        let (_, controller) = mounted().await;
        fill_form(&controller, "7", "Ada").await;

        let view = controller.submit_registration().await;
        assert_eq!(view.message, REGISTERED_MESSAGE);
        assert_eq!(view.students, vec![ada()]);
        assert_eq!(
            view.form,
            RegistrationForm {
                student_id: "7".to_owned(),
                student_name: "Ada".to_owned(),
            }
        );

        let view = controller.submit_removal(7).await;
        assert_eq!(view.message, REMOVED_MESSAGE);
        assert!(view.students.iter().all(|s| s.id != 7));
    }

    #[tokio::test]
    async fn revert_sets_failure_message_and_keeps_list() {
        let (registry, controller) = mounted().await;
        fill_form(&controller, "7", "Ada").await;
        controller.submit_registration().await;
        let before = controller.snapshot().await.students;

        let view = controller.submit_registration().await;

        assert!(view.message.starts_with("Error registering student: "));
        assert!(view.message.contains("Student ID already exists"));
        assert_eq!(view.students, before);
        assert_eq!(registry.read_calls(), 2);
    }

    #[tokio::test]
    async fn rejected_signature_is_reported() {
        let (registry, controller) = mounted().await;
        registry.insert(7, "Ada").await;
        registry.set_reject_signing(true);

        let view = controller.submit_removal(7).await;

        assert!(view.message.starts_with("Error removing student: "));
        assert!(view.message.contains("user rejected"));
    }

    #[tokio::test]
    async fn failed_refetch_keeps_previous_list() {
        let (registry, controller) = mounted().await;
        fill_form(&controller, "7", "Ada").await;
        controller.submit_registration().await;
        let before = controller.snapshot().await;

        registry.set_fail_reads(true);
        fill_form(&controller, "8", "Grace").await;
        let view = controller.submit_registration().await;

        assert_eq!(view.message, REGISTERED_MESSAGE);
        assert_eq!(view.students, before.students);
    }

    #[tokio::test]
    async fn status_slot_holds_only_latest_outcome() {
        let (_, controller) = mounted().await;
        fill_form(&controller, "", "Ada").await;
        let failed = controller.submit_registration().await;
        assert!(failed.message.starts_with("Error registering student: "));

        fill_form(&controller, "7", "Ada").await;
        let view = controller.submit_registration().await;
        assert_eq!(view.message, REGISTERED_MESSAGE);
    }

    #[tokio::test]
    async fn concurrent_submissions_are_not_serialized() -> Result<()> {
        let inner = Arc::new(InMemoryRegistry::default());
        let gated = Arc::new(GatedRegistry {
            inner: inner.clone(),
            confirmations: Barrier::new(3),
        });
        let controller = ViewController::new(Bootstrapper::new(inner.address().clone()), 1);
        controller.mount(Some(&GatedWallet(gated.clone()))).await;
        fill_form(&controller, "3", "Ada").await;

        let (first, second, in_flight) = tokio::join!(
            controller.submit_registration(),
            controller.submit_registration(),
            async {
                gated.confirmations.wait().await;
                inner.pending_count().await
            }
        );

        // Both passed the submission check before either was confirmed.
        assert_eq!(in_flight, 2);
        let messages = [first.message, second.message];
        assert!(messages.iter().any(|m| m == REGISTERED_MESSAGE), "{messages:?}");
        assert!(
            messages
                .iter()
                .any(|m| m.starts_with("Error registering student: transaction ") && m.ends_with(" reverted")),
            "{messages:?}"
        );
        assert_eq!(inner.get_all_students().await?.len(), 1);
        Ok(())
    }
}
