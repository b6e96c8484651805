use futures_util::stream;
use tracing::{Instrument, debug, info_span};

use crate::accumulator::{StreamAccumulator, consume_updates};
use crate::cancel::CancelHandle;
use crate::config::{LlmDescriptor, ModelCatalog};
use crate::dispatch::Dispatcher;
use crate::error::LLMError;
use crate::http::DynHttpTransport;
use crate::intake::{
    IntakeContextName, IntakeMethod, intake_context, map_options_to_intake_model,
};
use crate::provider::{DynVendor, VendorRegistry};
use crate::rate_limit::wait_rate_limit;
use crate::types::{ChatGenerateRequest, StreamUpdate, StreamingClientUpdate};

/// 调用入口 按逻辑模型 id 解析 Vendor 并分发请求
#[derive(Clone)]
pub struct RelayClient {
    catalog: ModelCatalog,
    registry: VendorRegistry,
    dispatcher: Dispatcher,
}

impl RelayClient {
    pub fn new(catalog: ModelCatalog, registry: VendorRegistry, transport: DynHttpTransport) -> Self {
        Self {
            catalog,
            registry,
            dispatcher: Dispatcher::new(transport),
        }
    }

    /// 创建 Builder 便于逐个注册模型与 Vendor
    pub fn builder() -> RelayClientBuilder {
        RelayClientBuilder {
            descriptors: Vec::new(),
            registry: VendorRegistry::with_builtin_vendors(),
        }
    }

    /// 返回当前已知的逻辑模型 id
    pub fn model_ids(&self) -> Vec<String> {
        self.catalog.ids()
    }

    /// 查找模型描述及其 Vendor
    ///
    /// # Errors
    ///
    /// [`LLMError::UnknownModel`] when no descriptor has `model_id` or its vendor id is
    /// not registered.
    pub fn find_vendor_for_llm(
        &self,
        model_id: &str,
    ) -> Result<(&LlmDescriptor, DynVendor), LLMError> {
        let unknown = || LLMError::UnknownModel {
            model: model_id.to_string(),
        };
        let descriptor = self.catalog.get(model_id).ok_or_else(unknown)?;
        let vendor = self.registry.get(&descriptor.vendor).ok_or_else(unknown)?;
        Ok((descriptor, vendor))
    }

    /// 流式生成 每个变化通过 `on_update` 回调
    ///
    /// The last callback always carries `done = true`. Vendor problems arrive as
    /// transcript text and transport faults are logged, so an `Err` means the request
    /// never started.
    ///
    /// # Errors
    ///
    /// [`LLMError::UnknownModel`], [`LLMError::Configuration`] or
    /// [`LLMError::InvalidCredentials`], before anything is sent and before
    /// `on_update` is called.
    pub async fn streaming_chat_generate<F>(
        &self,
        model_id: &str,
        request: ChatGenerateRequest,
        context_name: IntakeContextName,
        context_ref: &str,
        cancel: &CancelHandle,
        on_update: F,
    ) -> Result<(), LLMError>
    where
        F: FnMut(StreamingClientUpdate, bool),
    {
        let (descriptor, vendor) = self.find_vendor_for_llm(model_id)?;
        let model = map_options_to_intake_model(&descriptor.options, &descriptor.id)?;
        let access = vendor.transport_access(&descriptor.source)?;
        let context = intake_context(IntakeMethod::ChatStream, context_name, context_ref);

        let span = info_span!(
            "chat_stream",
            model = %descriptor.id,
            vendor = vendor.id(),
            context = context_name.as_str(),
            "ref" = %context_ref,
        );

        async {
            let delay = vendor.rate_limit_delay(descriptor, &descriptor.source);
            if let Err(err) = wait_rate_limit(delay, cancel).await {
                debug!(error = %err, "cancelled before dispatch");
                consume_updates(stream::empty::<Result<StreamUpdate, LLMError>>(), cancel, on_update)
                    .await;
                return;
            }

            let updates =
                self.dispatcher
                    .dispatch(access, model, request, context, cancel.clone());
            let accumulator = consume_updates(updates, cancel, on_update).await;
            debug!(
                chars = accumulator.text().len(),
                aborted = accumulator.aborted(),
                "stream finished"
            );
        }
        .instrument(span)
        .await;

        Ok(())
    }

    /// 单次生成 返回完整结果
    ///
    /// Issues are folded into `text_so_far` the same way as when streaming.
    ///
    /// # Errors
    ///
    /// Resolution errors as in [`RelayClient::streaming_chat_generate`], plus
    /// [`LLMError::Transport`] when the vendor cannot be reached.
    pub async fn chat_generate(
        &self,
        model_id: &str,
        request: ChatGenerateRequest,
        context_name: IntakeContextName,
        context_ref: &str,
    ) -> Result<StreamingClientUpdate, LLMError> {
        let (descriptor, vendor) = self.find_vendor_for_llm(model_id)?;
        let model = map_options_to_intake_model(&descriptor.options, &descriptor.id)?;
        let access = vendor.transport_access(&descriptor.source)?;
        let context = intake_context(IntakeMethod::ChatGenerate, context_name, context_ref);

        let span = info_span!(
            "chat_generate",
            model = %descriptor.id,
            vendor = vendor.id(),
            context = context_name.as_str(),
            "ref" = %context_ref,
        );

        async {
            let cancel = CancelHandle::new();
            wait_rate_limit(vendor.rate_limit_delay(descriptor, &descriptor.source), &cancel)
                .await?;
            let updates = self
                .dispatcher
                .generate(&access, &model, &request, &context, &cancel)
                .await?;

            let mut accumulator = StreamAccumulator::new();
            for update in updates {
                accumulator.apply(update);
            }
            accumulator.finish();
            Ok::<_, LLMError>(accumulator.snapshot())
        }
        .instrument(span)
        .await
    }
}

/// RelayClient 的 Builder
pub struct RelayClientBuilder {
    descriptors: Vec<LlmDescriptor>,
    registry: VendorRegistry,
}

impl RelayClientBuilder {
    /// 注册一个逻辑模型
    pub fn descriptor(mut self, descriptor: LlmDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// 注册额外的 Vendor 同 id 时覆盖内置实现
    pub fn vendor(mut self, vendor: DynVendor) -> Self {
        self.registry.register(vendor);
        self
    }

    /// 构建最终的 RelayClient
    pub fn build(self, transport: DynHttpTransport) -> Result<RelayClient, LLMError> {
        let catalog = ModelCatalog::from_descriptors(self.descriptors)?;
        Ok(RelayClient::new(catalog, self.registry, transport))
    }
}
