//! Pipeline planner: analysis to a validated, worker-bound execution plan.

use crate::analyzer::RequestAnalyzer;
use crate::error::{PipelineError, Result};
use crate::types::{
    ExecutionPlan, InputMapping, InputSource, PlanStep, RequestAnalysis, StepStatus,
};
use econos_market::CapabilityIndex;
use econos_types::{TaskType, Wei};
use rand::RngCore;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Hard ceiling on the estimated budget, when set.
    pub max_budget: Option<Wei>,
    /// Escrow duration requested for each step task; the orchestrator's
    /// default applies when unset.
    pub duration_secs: Option<u64>,
}

pub struct PipelinePlanner {
    index: Arc<CapabilityIndex>,
    analyzer: Arc<dyn RequestAnalyzer>,
}

impl PipelinePlanner {
    pub fn new(index: Arc<CapabilityIndex>, analyzer: Arc<dyn RequestAnalyzer>) -> Self {
        Self { index, analyzer }
    }

    /// Analyze a request, bind every proposed step to the cheapest current
    /// offer, and validate the result against the budget ceiling.
    pub async fn plan(&self, request: &str, options: &PlanOptions) -> Result<ExecutionPlan> {
        let capabilities = self.index.discover().await;
        let analysis = self.analyzer.analyze(request, &capabilities).await?;
        let plan = self.bind_analysis(request, &analysis, options).await?;
        self.validate(&plan).await?;

        info!(
            plan_id = %plan.plan_id,
            steps = plan.steps.len(),
            estimated_budget_wei = %plan.estimated_budget,
            confidence = analysis.confidence,
            "🗺️ Execution plan ready"
        );
        Ok(plan)
    }

    /// Build a single-step plan for an explicit `(task_type, params)` hire.
    pub async fn plan_direct(
        &self,
        task_type: TaskType,
        params: Value,
        options: &PlanOptions,
    ) -> Result<ExecutionPlan> {
        let offer = self
            .index
            .find_cheapest(task_type)
            .await
            .ok_or_else(|| PipelineError::NoWorkerForService(task_type.label().to_string()))?;
        let price = offer
            .price_for(task_type)
            .ok_or_else(|| PipelineError::NoWorkerForService(task_type.label().to_string()))?;

        if let Some(max) = options.max_budget {
            if price > max {
                return Err(PipelineError::BudgetExceeded { estimate: price, max });
            }
        }

        Ok(ExecutionPlan {
            plan_id: fresh_plan_id(),
            steps: vec![PlanStep {
                step_id: "step-1".to_string(),
                order: 1,
                service_type: task_type,
                description: format!("direct {} hire", task_type.label()),
                input_mapping: InputMapping::Direct { literal: params },
                assigned_worker: Some(offer.address),
                worker_endpoint: Some(offer.endpoint.clone()),
                price,
                duration_secs: options.duration_secs,
                status: StepStatus::Pending,
            }],
            estimated_budget: price,
            reasoning: "single-step plan from explicit task type".to_string(),
        })
    }

    async fn bind_analysis(
        &self,
        request: &str,
        analysis: &RequestAnalysis,
        options: &PlanOptions,
    ) -> Result<ExecutionPlan> {
        let mut steps: Vec<PlanStep> = Vec::with_capacity(analysis.steps.len());
        let mut ordered = analysis.steps.clone();
        ordered.sort_by_key(|s| s.order);

        for (i, analyzed) in ordered.iter().enumerate() {
            let offer = self
                .index
                .find_cheapest(analyzed.service_type)
                .await
                .ok_or_else(|| {
                    PipelineError::NoWorkerForService(analyzed.service_type.label().to_string())
                })?;
            let price = offer.price_for(analyzed.service_type).ok_or_else(|| {
                PipelineError::NoWorkerForService(analyzed.service_type.label().to_string())
            })?;

            let input_mapping = if i == 0 || analyzed.input_source == InputSource::User {
                InputMapping::Direct {
                    literal: json!({ "request": request }),
                }
            } else {
                InputMapping::FromPrevious {
                    source_step_id: steps[i - 1].step_id.clone(),
                    field: analyzed.input_field.clone(),
                }
            };

            steps.push(PlanStep {
                step_id: format!("step-{}", i + 1),
                order: analyzed.order,
                service_type: analyzed.service_type,
                description: analyzed.description.clone(),
                input_mapping,
                assigned_worker: Some(offer.address),
                worker_endpoint: Some(offer.endpoint.clone()),
                price,
                duration_secs: options.duration_secs,
                status: StepStatus::Pending,
            });
        }

        let estimated_budget: Wei = steps.iter().map(|s| s.price).sum();
        if let Some(max) = options.max_budget {
            if estimated_budget > max {
                return Err(PipelineError::BudgetExceeded {
                    estimate: estimated_budget,
                    max,
                });
            }
        }

        Ok(ExecutionPlan {
            plan_id: fresh_plan_id(),
            steps,
            estimated_budget,
            reasoning: analysis.reasoning.clone(),
        })
    }

    /// Check availability, worker binding, and topological soundness.
    pub async fn validate(&self, plan: &ExecutionPlan) -> Result<()> {
        let mut seen_ids: HashSet<&str> = HashSet::new();
        let mut last_order = 0u32;

        for step in &plan.steps {
            if !self.index.is_service_available(step.service_type).await {
                return Err(PipelineError::NoWorkerForService(
                    step.service_type.label().to_string(),
                ));
            }
            if step.assigned_worker.is_none() || step.worker_endpoint.is_none() {
                return Err(PipelineError::InvalidPlan(format!(
                    "step {} has no worker binding",
                    step.step_id
                )));
            }
            if step.order <= last_order {
                return Err(PipelineError::InvalidPlan(format!(
                    "step {} breaks topological order",
                    step.step_id
                )));
            }
            last_order = step.order;

            // References may only point backwards; anything else would be
            // a cycle once executed.
            match &step.input_mapping {
                InputMapping::FromPrevious { source_step_id, .. } => {
                    if !seen_ids.contains(source_step_id.as_str()) {
                        return Err(PipelineError::InvalidPlan(format!(
                            "step {} references {} which does not precede it",
                            step.step_id, source_step_id
                        )));
                    }
                }
                InputMapping::Merge { sources } => {
                    for source in sources {
                        if !seen_ids.contains(source.step_id.as_str()) {
                            return Err(PipelineError::InvalidPlan(format!(
                                "step {} merges {} which does not precede it",
                                step.step_id, source.step_id
                            )));
                        }
                    }
                }
                InputMapping::Direct { .. } | InputMapping::Transform { .. } => {}
            }

            seen_ids.insert(step.step_id.as_str());
        }

        Ok(())
    }

    /// Re-bind every step to the current cheapest offer and recompute the
    /// estimate.
    pub async fn optimize(&self, mut plan: ExecutionPlan) -> Result<ExecutionPlan> {
        for step in &mut plan.steps {
            let offer = self
                .index
                .find_cheapest(step.service_type)
                .await
                .ok_or_else(|| {
                    PipelineError::NoWorkerForService(step.service_type.label().to_string())
                })?;
            step.price = offer
                .price_for(step.service_type)
                .ok_or_else(|| {
                    PipelineError::NoWorkerForService(step.service_type.label().to_string())
                })?;
            step.assigned_worker = Some(offer.address);
            step.worker_endpoint = Some(offer.endpoint.clone());
        }
        plan.estimated_budget = plan.steps.iter().map(|s| s.price).sum();
        Ok(plan)
    }
}

fn fresh_plan_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("plan-{}", hex::encode(bytes))
}
