use bluenet::{
    gatt::{
        characteristic::{Access, Characteristic},
        event::{Event, EventSender, Response},
        service::Service,
    },
    Peripheral,
};
use futures::{channel::mpsc, StreamExt};
use log::info;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const HUB_SERVICE: &str = "f29b1523-cb19-40f3-be5c-7241ecb82fd2";
const HUB_NAME: &str = "f29b1524-cb19-40f3-be5c-7241ecb82fd2";

#[derive(Debug)]
struct HubService {
    uuid: Uuid,
    events: EventSender,
}

impl Service for HubService {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn characteristics(&self) -> Vec<Characteristic> {
        vec![Characteristic::new(Uuid::parse_str(HUB_NAME).unwrap())
            .with_access(Access::Read)
            .with_access(Access::Write)
            .with_events(self.events.clone())]
    }

    fn remote_disconnected(&self) {
        info!("Central went away, resetting hub service");
    }
}

#[tokio::main]
async fn main() -> Result<(), bluenet::Error> {
    pretty_env_logger::init();

    let (events, mut requests) = mpsc::channel(1);
    tokio::spawn(async move {
        let name = Mutex::new(b"Senic Hub".to_vec());
        while let Some(event) = requests.next().await {
            match event {
                Event::ReadRequest(read) => {
                    let value = name.lock().unwrap().clone();
                    let response = match value.get(read.offset as usize..) {
                        Some(rest) => Response::Success(rest.to_vec()),
                        None => Response::InvalidOffset,
                    };
                    let _ = read.response.send(response);
                }
                Event::WriteRequest(write) => {
                    info!("Hub renamed to {}", String::from_utf8_lossy(&write.data));
                    *name.lock().unwrap() = write.data;
                    let _ = write.response.send(Response::Success(Vec::new()));
                }
            }
        }
    });

    let uuid = Uuid::parse_str(HUB_SERVICE).unwrap();
    let mut peripheral = Peripheral::new("Senic Hub", None).await?;
    peripheral.add_service(Arc::new(HubService { uuid, events }));
    peripheral.add_advertised_service_uuid(uuid);

    info!("Advertising on {}, Ctrl-C to stop", peripheral.adapter().name());
    peripheral.run().await
}
