use cr_api_types::Student;
use cr_chain_client::{RegistryContract, StudentRecord, SubmittedTx, TxReceiptResult};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::RegistryError;

/// `students` is `None` when the refetch after confirmation failed.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub receipt: TxReceiptResult,
    pub students: Option<Vec<Student>>,
}

#[derive(Clone)]
pub struct Gateway {
    registry: Arc<dyn RegistryContract>,
    confirmations: u64,
}

impl Gateway {
    pub fn new(registry: Arc<dyn RegistryContract>, confirmations: u64) -> Self {
        Self {
            registry,
            confirmations: confirmations.max(1),
        }
    }

    pub async fn fetch_all(&self) -> Option<Vec<Student>> {
        match self.try_fetch_all().await {
            Ok(students) => Some(students),
            Err(err) => {
                warn!("Error fetching students: {}", err);
                None
            }
        }
    }

    pub async fn try_fetch_all(&self) -> Result<Vec<Student>, RegistryError> {
        let records = self
            .registry
            .get_all_students()
            .await
            .map_err(|err| RegistryError::ReadFailure(format!("{err:#}")))?;

        let students = normalize(records)?;
        debug!("fetched {} students from {}", students.len(), self.registry.address());
        Ok(students)
    }

    pub async fn register(&self, id: &str, name: &str) -> Result<MutationOutcome, RegistryError> {
        let id = parse_student_id(id)?;
        if name.trim().is_empty() {
            return Err(RegistryError::InvalidInput("Student name is required".to_owned()));
        }

        let tx = self
            .registry
            .register_student(id, name)
            .await
            .map_err(RegistryError::rejected)?;
        info!("registerStudent({}) submitted as {}", id, tx.tx_hash);

        self.finalize(tx).await
    }

    pub async fn remove(&self, id: u64) -> Result<MutationOutcome, RegistryError> {
        let tx = self
            .registry
            .remove_student(id)
            .await
            .map_err(RegistryError::rejected)?;
        info!("removeStudent({}) submitted as {}", id, tx.tx_hash);

        self.finalize(tx).await
    }

    async fn finalize(&self, tx: SubmittedTx) -> Result<MutationOutcome, RegistryError> {
        let receipt = self
            .registry
            .wait_for_confirmation(&tx, self.confirmations)
            .await
            .map_err(RegistryError::rejected)?;

        if !receipt.success {
            warn!("transaction {} reverted", receipt.tx_hash);
            return Err(RegistryError::TransactionRejectedOrReverted(format!(
                "transaction {} reverted",
                receipt.tx_hash
            )));
        }
        info!(
            "transaction {} confirmed in block {:?}",
            receipt.tx_hash, receipt.block_number
        );

        let students = self.fetch_all().await;
        Ok(MutationOutcome { receipt, students })
    }
}

fn parse_student_id(raw: &str) -> Result<u64, RegistryError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(RegistryError::InvalidInput("Student ID is required".to_owned()));
    }
    raw.parse::<u64>()
        .map_err(|_| RegistryError::InvalidInput(format!("invalid student ID '{raw}'")))
}

fn normalize(records: Vec<StudentRecord>) -> Result<Vec<Student>, RegistryError> {
    records
        .into_iter()
        .map(|record| {
            let id = record.id.parse::<u64>().map_err(|_| {
                RegistryError::ReadFailure(format!("student id {} does not fit a u64", record.id))
            })?;
            Ok(Student {
                id,
                name: record.name,
            })
        })
        .collect()
}
