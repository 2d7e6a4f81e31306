use futures::{channel::oneshot, SinkExt};
use uuid::Uuid;

use super::event::{Event, EventSender, ReadRequest, Response, WriteRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    WriteWithoutResponse,
}

impl Access {
    /// The `GattCharacteristic1.Flags` entry for this access.
    pub fn flag(self) -> &'static str {
        match self {
            Access::Read => "read",
            Access::Write => "write",
            Access::WriteWithoutResponse => "write-without-response",
        }
    }
}

/// A characteristic of a hosted service.
///
/// Reads and writes are forwarded as [`Event`]s when an event sender is
/// attached. Without one, reads answer with the fixed value and writes are
/// refused.
#[derive(Debug, Clone)]
pub struct Characteristic {
    uuid: Uuid,
    access: Vec<Access>,
    value: Option<Vec<u8>>,
    events: Option<EventSender>,
}

impl Characteristic {
    pub fn new(uuid: Uuid) -> Self {
        Characteristic {
            uuid,
            access: Vec::new(),
            value: None,
            events: None,
        }
    }

    pub fn with_access(mut self, access: Access) -> Self {
        if !self.access.contains(&access) {
            self.access.push(access);
        }
        self
    }

    pub fn with_value(mut self, value: Vec<u8>) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn flags(&self) -> Vec<&'static str> {
        self.access.iter().map(|access| access.flag()).collect()
    }

    fn allows(&self, access: Access) -> bool {
        self.access.contains(&access)
    }

    async fn request(
        &self,
        events: &EventSender,
        event: Event,
        response: oneshot::Receiver<Response>,
    ) -> Response {
        if events.clone().send(event).await.is_err() {
            return Response::UnlikelyError;
        }
        response.await.unwrap_or(Response::UnlikelyError)
    }

    pub async fn read(&self, offset: u16) -> Response {
        if !self.allows(Access::Read) {
            return Response::NotPermitted;
        }
        if let Some(events) = &self.events {
            let (sender, receiver) = oneshot::channel();
            let event = Event::ReadRequest(ReadRequest {
                offset,
                response: sender,
            });
            return self.request(events, event, receiver).await;
        }

        let value = self.value.as_deref().unwrap_or(&[]);
        match value.get(offset as usize..) {
            Some(rest) => Response::Success(rest.to_vec()),
            None => Response::InvalidOffset,
        }
    }

    pub async fn write(&self, data: Vec<u8>, offset: u16, without_response: bool) -> Response {
        let access = if without_response {
            Access::WriteWithoutResponse
        } else {
            Access::Write
        };
        let events = match &self.events {
            Some(events) if self.allows(access) => events,
            _ => return Response::NotPermitted,
        };
        let (sender, receiver) = oneshot::channel();
        let event = Event::WriteRequest(WriteRequest {
            data,
            offset,
            without_response,
            response: sender,
        });
        self.request(events, event, receiver).await
    }
}
