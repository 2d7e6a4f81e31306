use dbus::{
    arg::{prop_cast, PropMap},
    MethodErr, Path,
};
use dbus_crossroads::{Context, Crossroads, IfaceBuilder, IfaceToken};

use super::{
    common,
    constants::{
        BLUEZ_ERROR_FAILED, BLUEZ_ERROR_INVALID_OFFSET, BLUEZ_ERROR_INVALID_VALUE_LENGTH,
        BLUEZ_ERROR_NOT_PERMITTED, GATT_CHARACTERISTIC_IFACE, GATT_SERVICE_IFACE,
    },
};
use crate::{
    gatt::{characteristic::Characteristic, event::Response},
    peripheral::application::Application,
};

/// Declaration of one exported `GattService1` object.
#[derive(Debug, Clone)]
pub struct ServiceData {
    uuid: String,
    primary: bool,
}

/// One exported `GattCharacteristic1` object and the service it belongs to.
#[derive(Debug, Clone)]
pub struct CharacteristicData {
    service: Path<'static>,
    characteristic: Characteristic,
}

#[derive(Debug)]
pub struct ServiceExport {
    pub path: Path<'static>,
    pub service: ServiceData,
    pub characteristics: Vec<(Path<'static>, CharacteristicData)>,
}

pub fn register_service_iface(tree: &mut common::Tree) -> IfaceToken<ServiceData> {
    tree.register(GATT_SERVICE_IFACE, |b: &mut IfaceBuilder<ServiceData>| {
        b.property("UUID").get(|_ctx, service| Ok(service.uuid.clone()));
        b.property("Primary").get(|_ctx, service| Ok(service.primary));
    })
}

fn answer(response: Response) -> Result<Vec<u8>, MethodErr> {
    match response {
        Response::Success(value) => Ok(value),
        Response::InvalidOffset => Err((BLUEZ_ERROR_INVALID_OFFSET, "Invalid offset").into()),
        Response::InvalidAttributeLength => {
            Err((BLUEZ_ERROR_INVALID_VALUE_LENGTH, "Invalid value length").into())
        }
        Response::NotPermitted => Err((BLUEZ_ERROR_NOT_PERMITTED, "Not permitted").into()),
        Response::UnlikelyError => Err((BLUEZ_ERROR_FAILED, "Failed").into()),
    }
}

fn offset(options: &PropMap) -> u16 {
    prop_cast::<u16>(options, "offset").copied().unwrap_or(0)
}

fn characteristic_at(cr: &mut Crossroads, path: &Path<'static>) -> Option<Characteristic> {
    cr.data_mut::<CharacteristicData>(path)
        .map(|data| data.characteristic.clone())
}

pub fn register_characteristic_iface(tree: &mut common::Tree) -> IfaceToken<CharacteristicData> {
    tree.register(GATT_CHARACTERISTIC_IFACE, |b: &mut IfaceBuilder<CharacteristicData>| {
        b.property("UUID")
            .get(|_ctx, data| Ok(data.characteristic.uuid().to_string()));
        b.property("Service").get(|_ctx, data| Ok(data.service.clone()));
        b.property("Flags").get(|_ctx, data| {
            Ok(data
                .characteristic
                .flags()
                .into_iter()
                .map(str::to_owned)
                .collect::<Vec<String>>())
        });

        b.method_with_cr_async(
            "ReadValue",
            ("options",),
            ("value",),
            |mut ctx: Context, cr: &mut Crossroads, (options,): (PropMap,)| {
                let characteristic = characteristic_at(cr, ctx.path());
                let offset = offset(&options);
                async move {
                    let result = match characteristic {
                        Some(characteristic) => answer(characteristic.read(offset).await),
                        None => Err(MethodErr::no_path(ctx.path())),
                    };
                    ctx.reply(result.map(|value| (value,)))
                }
            },
        );

        b.method_with_cr_async(
            "WriteValue",
            ("value", "options"),
            (),
            |mut ctx: Context, cr: &mut Crossroads, (value, options): (Vec<u8>, PropMap)| {
                let characteristic = characteristic_at(cr, ctx.path());
                let offset = offset(&options);
                let without_response = prop_cast::<String>(&options, "type")
                    .map(|kind| kind == "command")
                    .unwrap_or(false);
                async move {
                    let result = match characteristic {
                        Some(characteristic) => {
                            answer(characteristic.write(value, offset, without_response).await)
                        }
                        None => Err(MethodErr::no_path(ctx.path())),
                    };
                    ctx.reply(result.map(|_| ()))
                }
            },
        );
    })
}

/// Object paths and declarations of the application's services and their
/// characteristics, in order.
pub fn exports(application: &Application) -> Result<Vec<ServiceExport>, String> {
    application
        .services()
        .iter()
        .enumerate()
        .map(|(index, service)| {
            let path = Path::new(application.service_path(index))?;
            let characteristics = service
                .characteristics()
                .into_iter()
                .enumerate()
                .map(|(char_index, characteristic)| {
                    let char_path = Path::new(application.characteristic_path(index, char_index))?;
                    Ok((
                        char_path,
                        CharacteristicData {
                            service: path.clone(),
                            characteristic,
                        },
                    ))
                })
                .collect::<Result<Vec<_>, String>>()?;
            Ok(ServiceExport {
                service: ServiceData {
                    uuid: service.uuid().to_string(),
                    primary: service.primary(),
                },
                path,
                characteristics,
            })
        })
        .collect()
}
